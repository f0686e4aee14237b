//! Connection pool integration tests against the mock driver.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Barrier};
use std::time::Duration;

use parking_lot::Mutex;
use sqlpool::{
    Call, Connection, DriverError, Interceptor, InterceptorDefinition, InterceptorFactory,
    InterceptorProperties, Method, Next, Pool, PoolConfig, PoolError, PoolStatus, Response,
};
use sqlpool_testing::{DriverEvent, DriverLog};

// =============================================================================
// Test interceptors
// =============================================================================

type Trace = Arc<Mutex<Vec<String>>>;

/// Records every call it sees under its own name, then passes it on.
struct Tracer {
    name: String,
    trace: Trace,
}

impl Interceptor for Tracer {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, call: &Call, next: Next<'_>) -> Result<Response, PoolError> {
        self.trace.lock().push(format!("{}:{}", self.name, call.method()));
        next.proceed(call)
    }
}

struct TracerFactory {
    name: &'static str,
    trace: Trace,
}

impl InterceptorFactory for TracerFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, properties: &InterceptorProperties) -> Result<Arc<dyn Interceptor>, PoolError> {
        let name = properties.get("label").unwrap_or(self.name).to_string();
        Ok(Arc::new(Tracer {
            name,
            trace: Arc::clone(&self.trace),
        }))
    }
}

/// Answers `isValid` itself without reaching the driver.
struct AlwaysInvalid;

impl Interceptor for AlwaysInvalid {
    fn name(&self) -> &str {
        "AlwaysInvalid"
    }

    fn invoke(&self, call: &Call, next: Next<'_>) -> Result<Response, PoolError> {
        match call.method() {
            Method::IsValid => Ok(Response::Bool(false)),
            _ => next.proceed(call),
        }
    }
}

struct AlwaysInvalidFactory;

impl InterceptorFactory for AlwaysInvalidFactory {
    fn name(&self) -> &str {
        "AlwaysInvalid"
    }

    fn create(&self, _: &InterceptorProperties) -> Result<Arc<dyn Interceptor>, PoolError> {
        Ok(Arc::new(AlwaysInvalid))
    }
}

fn tracer(name: &'static str, trace: &Trace) -> InterceptorDefinition {
    InterceptorDefinition::new(Arc::new(TracerFactory {
        name,
        trace: Arc::clone(trace),
    }))
}

// =============================================================================
// Basic pool operations
// =============================================================================

#[test]
fn test_pool_create_and_close() {
    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new().name("orders"), log.connector()).unwrap();

    assert_eq!(pool.name(), "orders");
    assert!(!pool.is_closed());
    pool.close();
    assert!(pool.is_closed());
    assert!(matches!(pool.get(), Err(PoolError::PoolClosed)));

    // Closing twice is harmless.
    pool.close();
}

#[test]
fn test_pool_rejects_invalid_config() {
    let log = DriverLog::new();
    let err = Pool::new(PoolConfig::new().max_connections(0), log.connector()).unwrap_err();
    assert!(matches!(err, PoolError::Configuration(_)));

    let trace = Trace::default();
    let config = PoolConfig::new()
        .interceptor(tracer("Tracer", &trace))
        .interceptor(tracer("Tracer", &trace));
    assert!(matches!(
        Pool::new(config, log.connector()),
        Err(PoolError::Configuration(_))
    ));
}

#[test]
fn test_pool_connection_reuse() {
    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new(), log.connector()).unwrap();

    for _ in 0..5 {
        let conn = pool.get().unwrap();
        conn.prepare_statement("SELECT 1").unwrap().execute().unwrap();
    }

    let connects = log
        .events()
        .iter()
        .filter(|e| matches!(e, DriverEvent::Connected { .. }))
        .count();
    assert_eq!(connects, 1);
}

#[test]
fn test_pool_status_tracking() {
    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new().max_connections(3), log.connector()).unwrap();

    let c1 = pool.get().unwrap();
    let c2 = pool.get().unwrap();
    assert_eq!(pool.status(), PoolStatus { available: 0, in_use: 2, total: 2, max: 3 });

    drop(c1);
    assert_eq!(pool.status(), PoolStatus { available: 1, in_use: 1, total: 2, max: 3 });

    c2.invalidate();
    assert_eq!(pool.status(), PoolStatus { available: 1, in_use: 0, total: 1, max: 3 });
    assert_eq!(log.closed_connections(), 1);
}

#[test]
fn test_pool_max_connections_reached() {
    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new().max_connections(2), log.connector()).unwrap();

    let _c1 = pool.get().unwrap();
    let _c2 = pool.get().unwrap();
    let err = pool.get().unwrap_err();
    assert!(matches!(err, PoolError::MaxConnectionsReached { max: 2 }));
    assert!(err.to_string().contains("maximum connections (2)"));
}

#[test]
fn test_pool_connection_creation_failure_releases_slot() {
    let connector = Arc::new(|| -> Result<Box<dyn Connection>, DriverError> {
        Err(DriverError::new("login failed").with_sql_state("28000"))
    });
    let pool = Pool::new(PoolConfig::new().max_connections(1), connector).unwrap();

    for _ in 0..3 {
        let err = pool.get().unwrap_err();
        assert!(matches!(err, PoolError::ConnectionCreation(ref e) if e.sql_state() == Some("28000")));
    }
    assert_eq!(pool.status().total, 0);
}

#[test]
fn test_pool_discards_invalid_idle_connection() {
    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new(), log.connector()).unwrap();

    let first = pool.get().unwrap().metadata().unwrap().id;
    log.set_connections_valid(false);
    let second = pool.get().unwrap().metadata().unwrap().id;

    assert_ne!(first, second);
    assert_eq!(log.closed_connections(), 1);
}

#[test]
fn test_pool_evicts_idle_connections() {
    let log = DriverLog::new();
    let config = PoolConfig::new().idle_timeout(Duration::from_millis(1));
    let pool = Pool::new(config, log.connector()).unwrap();

    drop(pool.get().unwrap());
    drop(pool.get().unwrap());
    std::thread::sleep(Duration::from_millis(10));

    assert_eq!(pool.evict_expired(), 1);
    assert_eq!(pool.status().total, 0);
    assert_eq!(log.closed_connections(), 1);
}

#[test]
fn test_pool_close_with_checked_out_connection() {
    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new(), log.connector()).unwrap();

    let idle = pool.get().unwrap();
    let busy = pool.get().unwrap();
    drop(idle);

    pool.close();
    assert_eq!(log.closed_connections(), 1);

    drop(busy);
    assert_eq!(log.closed_connections(), 2);
    assert_eq!(pool.status().total, 0);
}

// =============================================================================
// Interceptor chain
// =============================================================================

#[test]
fn test_interceptors_run_in_configured_order() {
    let log = DriverLog::new();
    let trace = Trace::default();
    let config = PoolConfig::new()
        .interceptor(tracer("Outer", &trace))
        .interceptor(tracer("Inner", &trace));
    let pool = Pool::new(config, log.connector()).unwrap();

    let conn = pool.get().unwrap();
    conn.prepare_call("{call p()}").unwrap();

    assert_eq!(
        *trace.lock(),
        vec!["Outer:prepareCall".to_string(), "Inner:prepareCall".to_string()]
    );
    assert_eq!(log.prepared_count(), 1);
}

#[test]
fn test_interceptor_receives_properties() {
    let log = DriverLog::new();
    let trace = Trace::default();
    let definition = tracer("Tracer", &trace)
        .with_properties(InterceptorProperties::parse("label=audit").unwrap());
    let pool = Pool::new(PoolConfig::new().interceptor(definition), log.connector()).unwrap();

    pool.get().unwrap().create_statement().unwrap();
    assert_eq!(*trace.lock(), vec!["audit:createStatement".to_string()]);
}

#[test]
fn test_interceptor_can_answer_calls() {
    let log = DriverLog::new();
    let config = PoolConfig::new()
        .test_on_checkout(false)
        .interceptor(InterceptorDefinition::new(Arc::new(AlwaysInvalidFactory)));
    let pool = Pool::new(config, log.connector()).unwrap();

    let conn = pool.get().unwrap();
    assert!(!conn.is_valid().unwrap());
    // The physical connection still reports itself valid.
    assert!(conn.connection().unwrap().is_valid());
}

#[test]
fn test_chain_is_built_per_connection() {
    let log = DriverLog::new();
    let trace = Trace::default();
    let config = PoolConfig::new().interceptor(tracer("Tracer", &trace));
    let pool = Pool::new(config, log.connector()).unwrap();

    let c1 = pool.get().unwrap();
    let c2 = pool.get().unwrap();
    c1.prepare_statement("SELECT 1").unwrap();
    c2.prepare_statement("SELECT 2").unwrap();

    assert_eq!(trace.lock().len(), 2);
    assert_eq!(log.prepared_count(), 2);
}

#[test]
fn test_connection_extensions_survive_checkout() {
    struct Marker(u32);

    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new(), log.connector()).unwrap();

    {
        let conn = pool.get().unwrap();
        conn.connection().unwrap().extensions().insert(Arc::new(Marker(7)));
    }
    let conn = pool.get().unwrap();
    let marker = conn.connection().unwrap().extensions().get::<Marker>().unwrap();
    assert_eq!(marker.0, 7);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_pool_concurrent_access() {
    const THREADS: usize = 8;

    let log = DriverLog::new();
    let pool = Pool::new(PoolConfig::new().max_connections(THREADS as u32), log.connector()).unwrap();
    let barrier = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..50 {
                    let conn = pool.get().unwrap();
                    let mut stmt = conn.prepare_statement("SELECT 1").unwrap();
                    assert_eq!(stmt.execute().unwrap(), 1);
                }
            });
        }
    });

    let status = pool.status();
    assert_eq!(status.in_use, 0);
    assert!(status.total <= THREADS as u32);
    assert_eq!(status.available, status.total);
}
