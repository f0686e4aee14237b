//! Statement cache error types.

use sqlpool::{Method, PoolError};
use thiserror::Error;

use crate::statement::CachedStatement;

/// Name the cache reports errors under.
pub const INTERCEPTOR_NAME: &str = "StatementCache";

/// Errors raised by the statement cache.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// A cache-eligible call did not produce a usable key.
    #[error("cannot compute a cache key for {method}")]
    InvalidKey {
        /// The intercepted operation.
        method: Method,
    },
}

impl From<CacheError> for PoolError {
    fn from(err: CacheError) -> Self {
        PoolError::Interceptor {
            name: INTERCEPTOR_NAME.to_string(),
            source: Box::new(err),
        }
    }
}

/// Why a statement was not admitted to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The statement has no cache key.
    NoKey,
    /// The cache is not bound to a live connection, the connection is
    /// being torn down, or the pool has not started.
    Unbound,
    /// An entry with the same key is already cached on the connection.
    Duplicate,
    /// The pool-wide bound has been reached.
    Full,
}

/// A statement refused by [`StatementCache::admit`](crate::StatementCache::admit).
///
/// Dropping the rejection physically closes the statement.
#[derive(Debug)]
pub struct Rejected {
    reason: RejectReason,
    statement: CachedStatement,
}

impl Rejected {
    pub(crate) fn new(reason: RejectReason, statement: CachedStatement) -> Self {
        Self { reason, statement }
    }

    /// Why the statement was refused.
    #[must_use]
    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// Take the refused statement back.
    #[must_use]
    pub fn into_statement(self) -> CachedStatement {
        self.statement
    }
}
