//! The statement cache interceptor.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use sqlpool::{
    Arg, Call, DriverError, Interceptor, InterceptorFactory, InterceptorProperties, Method, Next,
    Pool, PoolError, PooledConnection, Response, Statement,
};

use crate::config::StatementCacheConfig;
use crate::counter::AdmissionCounter;
use crate::error::{CacheError, INTERCEPTOR_NAME, RejectReason, Rejected};
use crate::key::CacheKey;
use crate::statement::{CachedStatement, DefaultStatementFactory, StatementFactory};
use crate::stats::CacheStats;
use crate::store::ConnectionStore;

/// Connection this instance is attached to.
#[derive(Clone)]
struct Binding {
    pool: String,
    connection: u64,
    counter: Option<Arc<AdmissionCounter>>,
    store: Arc<ConnectionStore>,
}

/// State shared between a cache instance and the statements it issued.
pub(crate) struct Shared {
    config: StatementCacheConfig,
    factory: Arc<dyn StatementFactory>,
    binding: RwLock<Option<Binding>>,
}

impl Shared {
    fn binding(&self) -> Option<Binding> {
        self.binding.read().clone()
    }

    fn lookup(&self, call: &Call) -> Result<Option<CachedStatement>, CacheError> {
        let method = call.method();
        if !self.config.is_eligible(method) || call.sql().is_none() {
            return Ok(None);
        }
        let key = self
            .config
            .classify(method, call.args())
            .ok_or(CacheError::InvalidKey { method })?;

        let Some(binding) = self.binding() else {
            tracing::warn!(%key, "statement cache used without an attached connection");
            return Ok(None);
        };

        match binding.store.take(&key) {
            Some(statement) => {
                if let Some(counter) = &binding.counter {
                    counter.release();
                }
                binding.store.record_hit();
                tracing::trace!(pool = %binding.pool, connection = binding.connection, %key, "statement cache hit");
                Ok(Some(statement))
            }
            None => {
                binding.store.record_miss();
                tracing::trace!(pool = %binding.pool, connection = binding.connection, %key, "statement cache miss");
                Ok(None)
            }
        }
    }

    fn admit(&self, candidate: CachedStatement) -> Result<(), Rejected> {
        match self.binding() {
            Some(binding) => self.admit_to(&binding, candidate),
            None => Err(Rejected::new(RejectReason::Unbound, candidate)),
        }
    }

    fn admit_to(&self, binding: &Binding, candidate: CachedStatement) -> Result<(), Rejected> {
        let Some(key) = candidate.key().cloned() else {
            return Err(Rejected::new(RejectReason::NoKey, candidate));
        };
        if binding.store.contains(&key) {
            return Err(Rejected::new(RejectReason::Duplicate, candidate));
        }
        let Some(counter) = binding.counter.as_deref() else {
            return Err(Rejected::new(RejectReason::Unbound, candidate));
        };
        if !counter.try_acquire(self.config.max_cache_size) {
            return Err(Rejected::new(RejectReason::Full, candidate));
        }

        match binding.store.insert_vacant(key, candidate) {
            Ok(()) => {
                tracing::debug!(
                    pool = %binding.pool,
                    connection = binding.connection,
                    cached = counter.get(),
                    "statement cached"
                );
                Ok(())
            }
            Err(rejected) => {
                counter.release();
                Err(rejected)
            }
        }
    }

    fn evict(&self, key: &CacheKey) -> Option<CachedStatement> {
        let binding = self.binding()?;
        let statement = binding.store.take(key)?;
        if let Some(counter) = &binding.counter {
            counter.release();
        }
        tracing::debug!(pool = %binding.pool, connection = binding.connection, %key, "statement evicted");
        Some(statement)
    }

    /// Try to move a closed statement into the store. Returns the statement
    /// when it has to be closed instead.
    pub(crate) fn recycle(
        self: &Arc<Self>,
        key: Option<CacheKey>,
        mut delegate: Box<dyn Statement>,
    ) -> Option<Box<dyn Statement>> {
        let Some(key) = key else {
            return Some(delegate);
        };
        let Some(binding) = self.binding() else {
            tracing::debug!(%key, "connection detached, closing statement");
            return Some(delegate);
        };
        let at_capacity = binding
            .counter
            .as_deref()
            .is_none_or(|c| c.get() >= self.config.max_cache_size);
        if at_capacity {
            tracing::trace!(pool = %binding.pool, %key, "statement cache full, closing statement");
            return Some(delegate);
        }
        if let Err(e) = reset(delegate.as_mut()) {
            tracing::debug!(pool = %binding.pool, %key, error = %e, "failed to reset statement, closing it");
            return Some(delegate);
        }

        let candidate = CachedStatement::new(Some(key), delegate, Arc::downgrade(self));
        match self.admit_to(&binding, candidate) {
            Ok(()) => None,
            Err(rejected) => {
                tracing::trace!(pool = %binding.pool, reason = ?rejected.reason(), "statement not cached");
                rejected.into_statement().take_delegate()
            }
        }
    }
}

/// Clear per-execution state so the statement can be reused.
fn reset(statement: &mut dyn Statement) -> Result<(), DriverError> {
    if let Some(result_set) = statement.result_set() {
        if !result_set.is_closed() {
            result_set.close()?;
        }
    }
    statement.clear_parameters()
}

/// Interceptor that recycles prepared and callable statements.
///
/// One instance is attached to each physical connection. Statements
/// returned by `prepareStatement`/`prepareCall` are wrapped so that closing
/// them parks the physical statement in the connection's store instead of
/// closing it; a later prepare with the same arguments reuses it without a
/// driver round-trip.
///
/// The number of parked statements is bounded per pool, not per
/// connection: every connection of a pool draws from one
/// [`AdmissionCounter`] kept in the pool's extensions.
#[derive(Clone)]
pub struct StatementCache {
    shared: Arc<Shared>,
}

impl StatementCache {
    /// Create a cache producing [`StatementFacade`](crate::StatementFacade)s.
    #[must_use]
    pub fn new(config: StatementCacheConfig) -> Self {
        Self::with_factory(config, Arc::new(DefaultStatementFactory))
    }

    /// Create a cache with a custom facade factory.
    #[must_use]
    pub fn with_factory(config: StatementCacheConfig, factory: Arc<dyn StatementFactory>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                binding: RwLock::new(None),
            }),
        }
    }

    /// The cache configuration.
    #[must_use]
    pub fn config(&self) -> &StatementCacheConfig {
        &self.shared.config
    }

    /// Compute the cache key for a call, if it is cache-eligible.
    #[must_use]
    pub fn classify(&self, method: Method, args: &[Arg]) -> Option<CacheKey> {
        self.shared.config.classify(method, args)
    }

    /// Take the statement cached for `call` out of the connection's store.
    ///
    /// Returns `Ok(None)` if the call is not cache-eligible or nothing is
    /// cached. A statement returned here is no longer visible to any other
    /// lookup.
    pub fn lookup(&self, call: &Call) -> Result<Option<CachedStatement>, CacheError> {
        self.shared.lookup(call)
    }

    /// Track a physical statement without wrapping it in a facade.
    ///
    /// `key` should come from [`classify`](Self::classify); a statement
    /// without a key is closed rather than cached.
    #[must_use]
    pub fn track(&self, key: Option<CacheKey>, statement: Box<dyn Statement>) -> CachedStatement {
        CachedStatement::new(key, statement, Arc::downgrade(&self.shared))
    }

    /// Wrap a freshly prepared statement in a facade.
    ///
    /// Every prepared statement is wrapped, including ones that are not
    /// cache-eligible. Whether it gets cached is decided when it is closed.
    pub fn wrap_new_statement(
        &self,
        statement: Box<dyn Statement>,
        call: &Call,
    ) -> Result<Box<dyn Statement>, DriverError> {
        let key = self.classify(call.method(), call.args());
        self.shared.factory.wrap(self.track(key, statement))
    }

    /// Put a statement into the connection's store.
    ///
    /// Refused when the statement has no key, the key is already cached on
    /// this connection, or the pool-wide limit is reached. A refused
    /// statement is closed when the [`Rejected`] value is dropped.
    pub fn admit(&self, candidate: CachedStatement) -> Result<(), Rejected> {
        self.shared.admit(candidate)
    }

    /// Remove the statement cached under `key`, releasing its slot.
    pub fn evict(&self, key: &CacheKey) -> Option<CachedStatement> {
        self.shared.evict(key)
    }

    /// Whether the instance is attached to a connection.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.shared.binding.read().is_some()
    }

    /// Statements cached across the whole pool.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.shared
            .binding()
            .and_then(|b| b.counter)
            .map_or(0, |c| c.get())
    }

    /// Statements cached on the attached connection.
    #[must_use]
    pub fn connection_cache_size(&self) -> usize {
        self.shared.binding().map_or(0, |b| b.store.len())
    }

    /// Snapshot of the cache's state.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let binding = self.shared.binding();
        let config = &self.shared.config;
        CacheStats {
            cache_size: binding
                .as_ref()
                .and_then(|b| b.counter.as_deref())
                .map_or(0, AdmissionCounter::get),
            connection_cache_size: binding.as_ref().map_or(0, |b| b.store.len()),
            max_cache_size: config.max_cache_size,
            cache_prepared: config.cache_prepared,
            cache_callable: config.cache_callable,
            hits: binding.as_ref().map_or(0, |b| b.store.hits()),
            misses: binding.as_ref().map_or(0, |b| b.store.misses()),
        }
    }
}

impl Interceptor for StatementCache {
    fn name(&self) -> &str {
        INTERCEPTOR_NAME
    }

    fn invoke(&self, call: &Call, next: Next<'_>) -> Result<Response, PoolError> {
        let method = call.method();
        if !method.is_prepare() {
            return next.proceed(call);
        }

        if let Some(statement) = self.lookup(call)? {
            match self.shared.factory.wrap(statement) {
                Ok(facade) => return Ok(Response::Statement(facade)),
                Err(e) => {
                    tracing::warn!(%method, error = %e, "failed to reissue cached statement, preparing a new one");
                }
            }
        }

        match next.proceed(call)? {
            Response::Statement(statement) => {
                Ok(Response::Statement(self.wrap_new_statement(statement, call)?))
            }
            other => Ok(other),
        }
    }

    fn pool_started(&self, pool: &Pool) {
        pool.extensions().get_or_insert_with(AdmissionCounter::new);
        tracing::debug!(
            pool = pool.name(),
            max_cache_size = self.shared.config.max_cache_size,
            "statement cache counter registered"
        );
    }

    fn pool_closed(&self, pool: &Pool) {
        if let Some(counter) = pool.extensions().remove::<AdmissionCounter>() {
            tracing::debug!(pool = pool.name(), cached = counter.get(), "statement cache counter removed");
        }
    }

    fn connection_attached(&self, pool: &Pool, connection: &PooledConnection) {
        let counter = pool.extensions().get::<AdmissionCounter>();
        if counter.is_none() {
            tracing::warn!(
                pool = pool.name(),
                connection = connection.id(),
                "pool has no statement cache counter, statements will not be cached"
            );
        }
        let store = connection.extensions().get_or_insert_with(ConnectionStore::new);
        *self.shared.binding.write() = Some(Binding {
            pool: pool.name().to_string(),
            connection: connection.id(),
            counter,
            store,
        });
    }

    fn connection_detached(&self) {
        self.shared.binding.write().take();
    }

    fn disconnected(&self, pool: &Pool, connection: &PooledConnection, finalizing: bool) {
        let Some(store) = connection.extensions().get::<ConnectionStore>() else {
            return;
        };
        let counter = self
            .shared
            .binding()
            .and_then(|b| b.counter)
            .or_else(|| pool.extensions().get::<AdmissionCounter>());

        let statements = store.drain();
        let total = statements.len();
        let mut failed = 0usize;
        for statement in statements {
            if let Some(counter) = &counter {
                counter.release();
            }
            let key = statement.key().cloned();
            if let Err(e) = statement.force_close() {
                failed += 1;
                tracing::warn!(
                    pool = pool.name(),
                    connection = connection.id(),
                    ?key,
                    error = %e,
                    "failed to close cached statement"
                );
            }
        }

        if total > 0 {
            tracing::debug!(
                pool = pool.name(),
                connection = connection.id(),
                closed = total,
                failed,
                finalizing,
                "released cached statements"
            );
        }
    }
}

impl fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCache")
            .field("config", &self.shared.config)
            .field("attached", &self.is_attached())
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

/// Builds [`StatementCache`] instances from interceptor properties.
///
/// ```rust,ignore
/// let config = PoolConfig::new().interceptor(
///     InterceptorDefinition::new(Arc::new(StatementCacheFactory::new()))
///         .property("prepared", "true")
///         .property("max", "100"),
/// );
/// ```
#[derive(Clone)]
pub struct StatementCacheFactory {
    statement_factory: Arc<dyn StatementFactory>,
}

impl StatementCacheFactory {
    /// Create a factory using [`DefaultStatementFactory`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            statement_factory: Arc::new(DefaultStatementFactory),
        }
    }

    /// Use a custom facade factory for every instance.
    #[must_use]
    pub fn with_statement_factory(mut self, factory: Arc<dyn StatementFactory>) -> Self {
        self.statement_factory = factory;
        self
    }
}

impl Default for StatementCacheFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatementCacheFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementCacheFactory").finish_non_exhaustive()
    }
}

impl InterceptorFactory for StatementCacheFactory {
    fn name(&self) -> &str {
        INTERCEPTOR_NAME
    }

    fn create(&self, properties: &InterceptorProperties) -> Result<Arc<dyn Interceptor>, PoolError> {
        let config = StatementCacheConfig::from_properties(properties);
        Ok(Arc::new(StatementCache::with_factory(
            config,
            Arc::clone(&self.statement_factory),
        )))
    }
}
