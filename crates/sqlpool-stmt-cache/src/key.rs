//! Cache keys.

use std::fmt;
use std::sync::Arc;

use sqlpool::{Arg, Method};

/// Kind of statement a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Created by `prepareStatement`.
    Prepared,
    /// Created by `prepareCall`.
    Callable,
}

impl StatementKind {
    /// Map a connection operation to a statement kind.
    #[must_use]
    pub fn from_method(method: Method) -> Option<Self> {
        match method {
            Method::PrepareStatement => Some(Self::Prepared),
            Method::PrepareCall => Some(Self::Callable),
            _ => None,
        }
    }

    /// The connection operation producing this kind.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::Prepared => Method::PrepareStatement,
            Self::Callable => Method::PrepareCall,
        }
    }
}

/// Identifies a cached statement by operation kind and call arguments.
///
/// Two keys are equal when the kinds match and the argument lists are equal
/// element by element, so the same SQL text prepared with different driver
/// flags yields different keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: StatementKind,
    args: Arc<[Arg]>,
}

impl CacheKey {
    /// Build a key for a prepare call. Returns `None` for operations that do
    /// not prepare statements.
    #[must_use]
    pub fn new(method: Method, args: &[Arg]) -> Option<Self> {
        let kind = StatementKind::from_method(method)?;
        Some(Self {
            kind,
            args: Arc::from(args),
        })
    }

    /// Statement kind.
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Call arguments, SQL text first.
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// SQL text.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        self.args.first().and_then(Arg::as_text)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheKey")
            .field("kind", &self.kind)
            .field("args", &&*self.args)
            .finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.method())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(key: &CacheKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_calls_yield_equal_keys() {
        let a = CacheKey::new(Method::PrepareStatement, &[Arg::from("SELECT 1")]).unwrap();
        let b = CacheKey::new(Method::PrepareStatement, &[Arg::from("SELECT 1")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_flags_distinguish_keys() {
        let plain = CacheKey::new(Method::PrepareStatement, &[Arg::from("INSERT INTO t VALUES (?)")]).unwrap();
        let with_keys = CacheKey::new(
            Method::PrepareStatement,
            &[Arg::from("INSERT INTO t VALUES (?)"), Arg::Int(1)],
        )
        .unwrap();
        assert_ne!(plain, with_keys);
    }

    #[test]
    fn test_kind_distinguishes_keys() {
        let args = [Arg::from("{call p()}")];
        let prepared = CacheKey::new(Method::PrepareStatement, &args).unwrap();
        let callable = CacheKey::new(Method::PrepareCall, &args).unwrap();
        assert_ne!(prepared, callable);
        assert_eq!(callable.kind(), StatementKind::Callable);
    }

    #[test]
    fn test_non_prepare_methods_have_no_key() {
        assert!(CacheKey::new(Method::CreateStatement, &[]).is_none());
        assert!(CacheKey::new(Method::IsValid, &[]).is_none());
    }

    #[test]
    fn test_display() {
        let key = CacheKey::new(
            Method::PrepareStatement,
            &[Arg::from("SELECT ?"), Arg::Int(1003), Arg::Int(1007)],
        )
        .unwrap();
        assert_eq!(key.to_string(), "prepareStatement(\"SELECT ?\", 1003, 1007)");
        assert_eq!(key.sql(), Some("SELECT ?"));
    }
}
