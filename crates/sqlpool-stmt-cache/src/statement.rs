//! Cached statement wrappers.
//!
//! A physical statement is owned by exactly one of two places at any time:
//!
//! - the caller, through a facade built by a [`StatementFactory`] (active)
//! - a [`ConnectionStore`](crate::ConnectionStore) entry (cached)
//!
//! Ownership moves between them by value. Closing a facade either moves
//! the statement into the store or closes it physically; a cache hit moves
//! it out again and wraps it in a fresh facade. A facade that has given up
//! its statement rejects every further call.

use std::fmt;
use std::sync::Weak;

use sqlpool::{Arg, DriverError, ResultSet, Statement};

use crate::cache::Shared;
use crate::key::CacheKey;

/// SQL state reported for calls on a closed facade.
pub const STATEMENT_CLOSED_STATE: &str = "HY010";

/// A physical statement tracked by the cache.
///
/// Dropping a `CachedStatement` that still holds its statement closes it
/// physically without attempting to cache it.
pub struct CachedStatement {
    key: Option<CacheKey>,
    delegate: Option<Box<dyn Statement>>,
    cache: Weak<Shared>,
}

impl CachedStatement {
    pub(crate) fn new(key: Option<CacheKey>, delegate: Box<dyn Statement>, cache: Weak<Shared>) -> Self {
        Self {
            key,
            delegate: Some(delegate),
            cache,
        }
    }

    /// The cache key, or `None` if the statement can never be cached.
    #[must_use]
    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    /// The physical statement.
    #[must_use]
    pub fn delegate(&self) -> Option<&dyn Statement> {
        self.delegate.as_deref()
    }

    /// The physical statement, mutably.
    #[must_use]
    pub fn delegate_mut(&mut self) -> Option<&mut (dyn Statement + 'static)> {
        self.delegate.as_deref_mut()
    }

    /// Hand the statement back to its cache, or close it if it cannot be
    /// cached.
    ///
    /// Always succeeds from the caller's side. A failed physical close is
    /// logged; use [`force_close`](Self::force_close) to observe it.
    pub fn close(mut self) {
        let Some(delegate) = self.delegate.take() else {
            return;
        };

        let key = self.key.take();
        let leftover = match self.cache.upgrade() {
            Some(cache) => cache.recycle(key.clone(), delegate),
            None => Some(delegate),
        };

        if let Some(mut delegate) = leftover {
            if let Err(e) = delegate.close() {
                tracing::warn!(?key, error = %e, "failed to close uncached statement");
            }
        }
    }

    /// Close the statement physically, never caching it.
    pub fn force_close(mut self) -> Result<(), DriverError> {
        match self.delegate.take() {
            Some(mut delegate) => delegate.close(),
            None => Ok(()),
        }
    }

    pub(crate) fn take_delegate(mut self) -> Option<Box<dyn Statement>> {
        self.delegate.take()
    }
}

impl Drop for CachedStatement {
    fn drop(&mut self) {
        if let Some(mut delegate) = self.delegate.take() {
            if let Err(e) = delegate.close() {
                tracing::warn!(key = ?self.key, error = %e, "failed to close statement");
            }
        }
    }
}

impl fmt::Debug for CachedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedStatement")
            .field("key", &self.key)
            .field("open", &self.delegate.is_some())
            .finish()
    }
}

/// Builds the caller-facing handle for a statement leaving the cache.
///
/// A factory that fails should drop the statement it was given, which
/// closes it.
pub trait StatementFactory: Send + Sync {
    /// Wrap `statement` in a facade.
    fn wrap(&self, statement: CachedStatement) -> Result<Box<dyn Statement>, DriverError>;
}

/// Factory producing [`StatementFacade`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatementFactory;

impl StatementFactory for DefaultStatementFactory {
    fn wrap(&self, statement: CachedStatement) -> Result<Box<dyn Statement>, DriverError> {
        Ok(Box::new(StatementFacade::new(statement)))
    }
}

/// Caller-facing statement handle.
///
/// Closing or dropping the facade returns the statement to the cache.
pub struct StatementFacade {
    inner: Option<CachedStatement>,
}

impl StatementFacade {
    /// Wrap a cached statement.
    #[must_use]
    pub fn new(statement: CachedStatement) -> Self {
        Self {
            inner: Some(statement),
        }
    }

    /// Cache key of the wrapped statement.
    #[must_use]
    pub fn key(&self) -> Option<&CacheKey> {
        self.inner.as_ref().and_then(CachedStatement::key)
    }

    /// Close the statement physically instead of returning it to the cache.
    pub fn force_close(&mut self) -> Result<(), DriverError> {
        match self.inner.take() {
            Some(statement) => statement.force_close(),
            None => Ok(()),
        }
    }

    fn delegate(&mut self) -> Result<&mut (dyn Statement + 'static), DriverError> {
        self.inner
            .as_mut()
            .and_then(|s| s.delegate_mut())
            .ok_or_else(|| DriverError::new("statement is closed").with_sql_state(STATEMENT_CLOSED_STATE))
    }
}

impl Statement for StatementFacade {
    fn bind(&mut self, index: usize, value: Arg) -> Result<(), DriverError> {
        self.delegate()?.bind(index, value)
    }

    fn execute(&mut self) -> Result<u64, DriverError> {
        self.delegate()?.execute()
    }

    fn result_set(&mut self) -> Option<&mut dyn ResultSet> {
        self.inner.as_mut()?.delegate_mut()?.result_set()
    }

    fn clear_parameters(&mut self) -> Result<(), DriverError> {
        self.delegate()?.clear_parameters()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(statement) = self.inner.take() {
            statement.close();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner
            .as_ref()
            .and_then(CachedStatement::delegate)
            .is_none_or(|d| d.is_closed())
    }
}

impl Drop for StatementFacade {
    fn drop(&mut self) {
        if let Some(statement) = self.inner.take() {
            statement.close();
        }
    }
}

impl fmt::Debug for StatementFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementFacade")
            .field("statement", &self.inner)
            .finish()
    }
}
