//! Connection pool with a custom interceptor.
//!
//! Runs against the in-memory mock driver, so no database is needed. Set
//! `RUST_LOG=sqlpool=debug` to see pool lifecycle logging.
//!
//! # Running
//!
//! ```bash
//! cargo run -p sqlpool --example connection_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sqlpool::{
    Call, Interceptor, InterceptorDefinition, InterceptorFactory, InterceptorProperties, Next,
    Pool, PoolConfig, PoolError, Response,
};
use sqlpool_testing::DriverLog;
use tracing_subscriber::EnvFilter;

/// Counts prepare calls and reports slow ones.
struct SlowCallLogger {
    threshold: Duration,
    calls: Arc<AtomicU64>,
}

impl Interceptor for SlowCallLogger {
    fn name(&self) -> &str {
        "SlowCallLogger"
    }

    fn invoke(&self, call: &Call, next: Next<'_>) -> Result<Response, PoolError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let response = next.proceed(call);
        let elapsed = start.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(method = %call.method(), sql = ?call.sql(), ?elapsed, "slow call");
        }
        response
    }
}

struct SlowCallLoggerFactory {
    calls: Arc<AtomicU64>,
}

impl InterceptorFactory for SlowCallLoggerFactory {
    fn name(&self) -> &str {
        "SlowCallLogger"
    }

    fn create(&self, properties: &InterceptorProperties) -> Result<Arc<dyn Interceptor>, PoolError> {
        let millis = properties.value_as_int("thresholdMs", 100);
        Ok(Arc::new(SlowCallLogger {
            threshold: Duration::from_millis(millis as u64),
            calls: Arc::clone(&self.calls),
        }))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Connection Pool Example ===\n");

    let calls = Arc::new(AtomicU64::new(0));
    let logger = InterceptorDefinition::new(Arc::new(SlowCallLoggerFactory {
        calls: Arc::clone(&calls),
    }))
    .with_properties(InterceptorProperties::parse("thresholdMs=5")?);

    let config = PoolConfig::new()
        .name("example")
        .max_connections(4)
        .idle_timeout(Duration::from_secs(300))
        .interceptor(logger);

    println!("Pool configuration:");
    println!("  Max connections: {}", config.max_connections);
    println!("  Idle timeout: {:?}", config.idle_timeout);
    println!("  Interceptors: {}", config.interceptors.len());
    println!();

    let log = DriverLog::new();
    let pool = Pool::new(config, log.connector())?;

    std::thread::scope(|s| {
        for worker in 0..4 {
            let pool = Arc::clone(&pool);
            s.spawn(move || {
                for i in 0..10 {
                    let conn = pool.get().expect("pool has capacity for every worker");
                    let mut stmt = conn
                        .prepare_statement(&format!("SELECT {worker}, {i}"))
                        .expect("mock driver prepares any SQL");
                    stmt.execute().expect("mock driver executes any statement");
                }
            });
        }
    });

    let status = pool.status();
    println!("Pool status after load:");
    println!("  Total: {}", status.total);
    println!("  Available: {}", status.available);
    println!("  In use: {}", status.in_use);
    println!("  Calls intercepted: {}", calls.load(Ordering::Relaxed));
    println!("  Statements prepared: {}", log.prepared_count());

    pool.close();
    println!("\nPool closed, {} connections released", log.closed_connections());

    Ok(())
}
