//! Connection pool implementation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::driver::{Arg, Connection, Connector, Statement};
use crate::error::PoolError;
use crate::extensions::Extensions;
use crate::interceptor::{Call, Interceptor, Method, Next, Response};
use crate::lifecycle::ConnectionMetadata;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A connection pool.
///
/// The pool hands out physical connections wrapped in their interceptor
/// chain and fires lifecycle events on every interceptor: `pool_started`
/// and `pool_closed` on pool-level instances, `connection_attached` on each
/// checkout, `disconnected` and `connection_detached` when a physical
/// connection is torn down.
///
/// Acquisition never blocks: when every connection is in use and the pool is
/// at capacity, [`Pool::get`] fails with [`PoolError::MaxConnectionsReached`].
pub struct Pool {
    id: u64,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    extensions: Extensions,
    listeners: Vec<Arc<dyn Interceptor>>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
    next_connection_id: AtomicU64,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Arc<PooledConnection>>,
    in_use: u32,
    total: u32,
}

impl Pool {
    /// Create a pool and fire `pool_started` on every configured interceptor.
    pub fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Result<Arc<Self>, PoolError> {
        config.validate()?;

        let listeners = config
            .interceptors
            .iter()
            .map(|def| def.instantiate())
            .collect::<Result<Vec<_>, _>>()?;

        let pool = Arc::new(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            connector,
            extensions: Extensions::new(),
            listeners,
            state: Mutex::new(PoolState::default()),
            closed: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
        });

        for listener in &pool.listeners {
            listener.pool_started(&pool);
        }

        tracing::info!(
            pool = %pool.config.name,
            max_connections = pool.config.max_connections,
            interceptors = pool.listeners.len(),
            "connection pool started"
        );

        Ok(pool)
    }

    /// Get a connection from the pool.
    ///
    /// Reuses an idle connection when one is available, validating it first
    /// if `test_on_checkout` is set. Otherwise opens a new connection if the
    /// pool is below capacity.
    pub fn get(self: &Arc<Self>) -> Result<PooledConnectionGuard, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        tracing::trace!(pool = %self.config.name, "acquiring connection from pool");

        let conn = self.acquire()?;
        conn.metadata.lock().mark_checkout();
        for interceptor in &conn.chain {
            interceptor.connection_attached(self, &conn);
        }

        Ok(PooledConnectionGuard {
            pool: Arc::clone(self),
            conn: Some(conn),
            invalidated: false,
        })
    }

    fn acquire(&self) -> Result<Arc<PooledConnection>, PoolError> {
        loop {
            let mut state = self.state.lock();
            if let Some(conn) = state.idle.pop() {
                state.in_use += 1;
                drop(state);

                if self.config.test_on_checkout && !conn.is_valid() {
                    tracing::debug!(
                        pool = %self.config.name,
                        connection = conn.id,
                        "discarding invalid idle connection"
                    );
                    self.release_slot(true);
                    self.disconnect(&conn, false);
                    continue;
                }
                return Ok(conn);
            }

            if state.total >= self.config.max_connections {
                return Err(PoolError::MaxConnectionsReached {
                    max: self.config.max_connections,
                });
            }
            state.total += 1;
            state.in_use += 1;
            drop(state);

            return self.open_connection().inspect_err(|_| self.release_slot(true));
        }
    }

    fn open_connection(&self) -> Result<Arc<PooledConnection>, PoolError> {
        let mut physical = self
            .connector
            .connect()
            .map_err(PoolError::ConnectionCreation)?;

        let chain = match self
            .config
            .interceptors
            .iter()
            .map(|def| def.instantiate())
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(chain) => chain,
            Err(e) => {
                if let Err(close_err) = physical.close() {
                    tracing::warn!(error = %close_err, "failed to close connection after setup error");
                }
                return Err(e);
            }
        };

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(pool = %self.config.name, connection = id, "opened connection");

        Ok(Arc::new(PooledConnection {
            id,
            physical: Mutex::new(Some(physical)),
            metadata: Mutex::new(ConnectionMetadata::new(id)),
            chain,
            extensions: Extensions::new(),
        }))
    }

    fn release_slot(&self, in_use: bool) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        if in_use {
            state.in_use = state.in_use.saturating_sub(1);
        }
    }

    fn return_connection(&self, conn: Arc<PooledConnection>) {
        let mut state = self.state.lock();
        if self.is_closed() || conn.metadata.lock().state.is_terminal() {
            state.total = state.total.saturating_sub(1);
            state.in_use = state.in_use.saturating_sub(1);
            drop(state);
            self.disconnect(&conn, false);
            return;
        }

        tracing::trace!(pool = %self.config.name, connection = conn.id, "returning connection to pool");
        conn.metadata.lock().mark_checkin();
        state.in_use = state.in_use.saturating_sub(1);
        state.idle.push(conn);
    }

    fn discard(&self, conn: Arc<PooledConnection>) {
        self.release_slot(true);
        self.disconnect(&conn, false);
    }

    /// Tear down a physical connection.
    ///
    /// Interceptors see `disconnected` before the physical connection is
    /// closed, then `connection_detached`.
    fn disconnect(&self, conn: &PooledConnection, finalizing: bool) {
        conn.metadata.lock().mark_closing();

        for interceptor in &conn.chain {
            interceptor.disconnected(self, conn, finalizing);
        }

        if let Some(mut physical) = conn.physical.lock().take() {
            if let Err(e) = physical.close() {
                tracing::warn!(
                    pool = %self.config.name,
                    connection = conn.id,
                    error = %e,
                    "error closing connection"
                );
            }
        }

        for interceptor in &conn.chain {
            interceptor.connection_detached();
        }

        conn.metadata.lock().mark_closed();
        tracing::debug!(pool = %self.config.name, connection = conn.id, "connection disconnected");
    }

    /// Disconnect idle connections that exceeded the idle timeout or their
    /// maximum lifetime. Returns the number of connections evicted.
    pub fn evict_expired(&self) -> usize {
        let expired: Vec<_> = {
            let mut state = self.state.lock();
            let (expired, keep): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.idle).into_iter().partition(|conn| {
                    let meta = conn.metadata.lock();
                    meta.is_idle_expired(self.config.idle_timeout)
                        || meta.is_expired(self.config.max_lifetime)
                });
            state.idle = keep;
            state.total = state.total.saturating_sub(expired.len() as u32);
            expired
        };

        for conn in &expired {
            self.disconnect(conn, false);
        }
        if !expired.is_empty() {
            tracing::debug!(pool = %self.config.name, evicted = expired.len(), "evicted expired connections");
        }
        expired.len()
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            available: state.idle.len() as u32,
            in_use: state.in_use,
            total: state.total,
            max: self.config.max_connections,
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are disconnected immediately; checked-out
    /// connections are disconnected when returned. Fires `pool_closed` on
    /// every interceptor.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let idle = {
            let mut state = self.state.lock();
            let idle = std::mem::take(&mut state.idle);
            state.total = state.total.saturating_sub(idle.len() as u32);
            idle
        };
        for conn in &idle {
            self.disconnect(conn, true);
        }

        for listener in &self.listeners {
            listener.pool_closed(self);
        }
        tracing::info!(pool = %self.config.name, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Process-unique pool identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Pool-scoped attributes shared by every connection.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

/// A physical connection owned by the pool, with its interceptor chain and
/// attributes.
pub struct PooledConnection {
    id: u64,
    physical: Mutex<Option<Box<dyn Connection>>>,
    metadata: Mutex<ConnectionMetadata>,
    chain: Vec<Arc<dyn Interceptor>>,
    extensions: Extensions,
}

impl PooledConnection {
    /// Connection identifier, unique within its pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot of the connection's metadata.
    #[must_use]
    pub fn metadata(&self) -> ConnectionMetadata {
        self.metadata.lock().clone()
    }

    /// Connection-scoped attributes.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Whether the physical connection is open and reports itself valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.physical.lock().as_ref().is_some_and(|c| c.is_valid())
    }

    /// Whether the physical connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.physical.lock().is_none()
    }

    /// Send a call through the interceptor chain.
    pub fn invoke(&self, call: &Call) -> Result<Response, PoolError> {
        Next::new(&self.chain, self).proceed(call)
    }

    /// Terminal dispatch to the physical connection.
    pub(crate) fn dispatch(&self, call: &Call) -> Result<Response, PoolError> {
        let mut guard = self.physical.lock();
        let physical = guard.as_mut().ok_or(PoolError::ConnectionClosed)?;

        let response = match call.method() {
            Method::PrepareStatement => Response::Statement(physical.prepare_statement(call.args())?),
            Method::PrepareCall => Response::Statement(physical.prepare_call(call.args())?),
            Method::CreateStatement => Response::Statement(physical.create_statement()?),
            Method::IsValid => Response::Bool(physical.is_valid()),
        };
        Ok(response)
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("state", &self.metadata.lock().state)
            .field("interceptors", &self.chain.len())
            .finish()
    }
}

/// A connection checked out from the pool.
///
/// When dropped, the connection is automatically returned to the pool.
pub struct PooledConnectionGuard {
    pool: Arc<Pool>,
    conn: Option<Arc<PooledConnection>>,
    invalidated: bool,
}

impl PooledConnectionGuard {
    fn conn(&self) -> Result<&Arc<PooledConnection>, PoolError> {
        self.conn.as_ref().ok_or(PoolError::ConnectionClosed)
    }

    /// Send a call through the interceptor chain.
    pub fn invoke(&self, call: &Call) -> Result<Response, PoolError> {
        self.conn()?.invoke(call)
    }

    /// Prepare a statement from SQL text.
    pub fn prepare_statement(&self, sql: &str) -> Result<Box<dyn Statement>, PoolError> {
        self.prepare_statement_with(vec![Arg::from(sql)])
    }

    /// Prepare a statement with driver flags. `args[0]` is the SQL text.
    pub fn prepare_statement_with(&self, args: Vec<Arg>) -> Result<Box<dyn Statement>, PoolError> {
        self.invoke(&Call::new(Method::PrepareStatement, args))?
            .into_statement()
    }

    /// Prepare a stored procedure call.
    pub fn prepare_call(&self, sql: &str) -> Result<Box<dyn Statement>, PoolError> {
        self.prepare_call_with(vec![Arg::from(sql)])
    }

    /// Prepare a stored procedure call with driver flags.
    pub fn prepare_call_with(&self, args: Vec<Arg>) -> Result<Box<dyn Statement>, PoolError> {
        self.invoke(&Call::new(Method::PrepareCall, args))?
            .into_statement()
    }

    /// Create an unprepared statement.
    pub fn create_statement(&self) -> Result<Box<dyn Statement>, PoolError> {
        self.invoke(&Call::new(Method::CreateStatement, Vec::new()))?
            .into_statement()
    }

    /// Ask the connection whether it is still usable.
    pub fn is_valid(&self) -> Result<bool, PoolError> {
        self.invoke(&Call::new(Method::IsValid, Vec::new()))?
            .into_bool()
    }

    /// The underlying pooled connection.
    pub fn connection(&self) -> Result<&Arc<PooledConnection>, PoolError> {
        self.conn()
    }

    /// Snapshot of the connection's metadata.
    pub fn metadata(&self) -> Result<ConnectionMetadata, PoolError> {
        Ok(self.conn()?.metadata())
    }

    /// The pool this connection belongs to.
    #[must_use]
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Disconnect the connection instead of returning it to the pool.
    pub fn invalidate(mut self) {
        self.invalidated = true;
    }
}

impl fmt::Debug for PooledConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionGuard")
            .field("pool", &self.pool.name())
            .field("connection", &self.conn.as_ref().map(|c| c.id))
            .finish()
    }
}

impl Drop for PooledConnectionGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.invalidated {
                self.pool.discard(conn);
            } else {
                self.pool.return_connection(conn);
            }
        }
    }
}
