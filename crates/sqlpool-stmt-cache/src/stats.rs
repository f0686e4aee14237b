//! Cache statistics.

/// Point-in-time view of a statement cache attached to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Statements cached across every connection of the pool.
    pub cache_size: usize,
    /// Statements cached on this connection.
    pub connection_cache_size: usize,
    /// Pool-wide limit.
    pub max_cache_size: usize,
    /// Whether prepared statements are cached.
    pub cache_prepared: bool,
    /// Whether callable statements are cached.
    pub cache_callable: bool,
    /// Lookups on this connection answered from the cache.
    pub hits: u64,
    /// Lookups on this connection that missed.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, from 0.0 to 1.0.
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Remaining pool-wide capacity.
    #[must_use]
    pub fn available(&self) -> usize {
        self.max_cache_size.saturating_sub(self.cache_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(hits: u64, misses: u64) -> CacheStats {
        CacheStats {
            cache_size: 3,
            connection_cache_size: 1,
            max_cache_size: 5,
            cache_prepared: true,
            cache_callable: false,
            hits,
            misses,
        }
    }

    #[test]
    fn test_hit_ratio() {
        assert_eq!(stats(0, 0).hit_ratio(), 0.0);
        assert!((stats(3, 1).hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_available() {
        assert_eq!(stats(0, 0).available(), 2);
    }
}
