//! Statement cache configuration.

use sqlpool::{Arg, InterceptorProperties, Method};

use crate::key::CacheKey;

/// Default pool-wide limit on cached statements.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 50;

const ALL_TYPES: &[Method] = &[Method::PrepareStatement, Method::PrepareCall];
const PREPARED_TYPES: &[Method] = &[Method::PrepareStatement];
const CALLABLE_TYPES: &[Method] = &[Method::PrepareCall];
const NO_TYPES: &[Method] = &[];

/// Configuration for the statement cache.
///
/// Read from interceptor properties:
///
/// | Key        | Type  | Default |
/// |------------|-------|---------|
/// | `prepared` | bool  | `true`  |
/// | `callable` | bool  | `false` |
/// | `max`      | int   | `50`    |
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct StatementCacheConfig {
    /// Cache statements created by `prepareStatement`.
    pub cache_prepared: bool,
    /// Cache statements created by `prepareCall`.
    pub cache_callable: bool,
    /// Maximum number of statements cached across every connection of a
    /// pool.
    pub max_cache_size: usize,
}

impl Default for StatementCacheConfig {
    fn default() -> Self {
        Self {
            cache_prepared: true,
            cache_callable: false,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

impl StatementCacheConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that caches nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            cache_prepared: false,
            cache_callable: false,
            max_cache_size: 0,
        }
    }

    /// Read the configuration from interceptor properties. Missing or
    /// unparseable values keep their defaults.
    #[must_use]
    pub fn from_properties(properties: &InterceptorProperties) -> Self {
        let defaults = Self::default();
        Self {
            cache_prepared: properties.value_as_bool("prepared", defaults.cache_prepared),
            cache_callable: properties.value_as_bool("callable", defaults.cache_callable),
            max_cache_size: properties.value_as_int("max", defaults.max_cache_size),
        }
    }

    /// Enable or disable caching of prepared statements.
    #[must_use]
    pub fn cache_prepared(mut self, enabled: bool) -> Self {
        self.cache_prepared = enabled;
        self
    }

    /// Enable or disable caching of callable statements.
    #[must_use]
    pub fn cache_callable(mut self, enabled: bool) -> Self {
        self.cache_callable = enabled;
        self
    }

    /// Set the pool-wide cache limit.
    #[must_use]
    pub fn max_cache_size(mut self, max: usize) -> Self {
        self.max_cache_size = max;
        self
    }

    /// Operations whose statements may be cached.
    #[must_use]
    pub fn types(&self) -> &'static [Method] {
        match (self.cache_prepared, self.cache_callable) {
            (true, true) => ALL_TYPES,
            (true, false) => PREPARED_TYPES,
            (false, true) => CALLABLE_TYPES,
            (false, false) => NO_TYPES,
        }
    }

    /// Whether statements produced by `method` may be cached.
    #[must_use]
    pub fn is_eligible(&self, method: Method) -> bool {
        self.types().contains(&method)
    }

    /// Compute the cache key for a call, if it is cache-eligible.
    ///
    /// Requires an eligible operation and a non-empty argument list whose
    /// first element is the SQL text.
    #[must_use]
    pub fn classify(&self, method: Method, args: &[Arg]) -> Option<CacheKey> {
        if !self.is_eligible(method) {
            return None;
        }
        args.first().and_then(Arg::as_text)?;
        CacheKey::new(method, args)
    }
}
