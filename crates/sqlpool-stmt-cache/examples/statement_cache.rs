//! Statement cache walkthrough.
//!
//! Prepares the same statements repeatedly through a pool with the
//! statement cache installed and prints how many times the driver actually
//! prepared them. Runs against the in-memory mock driver.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=sqlpool_stmt_cache=trace cargo run -p sqlpool-stmt-cache --example statement_cache
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use sqlpool::{Arg, InterceptorDefinition, Pool, PoolConfig};
use sqlpool_stmt_cache::{AdmissionCounter, ConnectionStore, StatementCacheFactory};
use sqlpool_testing::DriverLog;
use tracing_subscriber::EnvFilter;

const QUERIES: &[&str] = &[
    "SELECT name FROM users WHERE id = ?",
    "SELECT total FROM orders WHERE user_id = ?",
    "UPDATE users SET last_seen = CURRENT_TIMESTAMP WHERE id = ?",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Statement Cache Example ===\n");

    let cache = InterceptorDefinition::new(Arc::new(StatementCacheFactory::new()))
        .property("prepared", "true")
        .property("callable", "false")
        .property("max", "2");
    let config = PoolConfig::new().name("cached").max_connections(2).interceptor(cache);

    let log = DriverLog::new();
    let pool = Pool::new(config, log.connector())?;

    for round in 1..=3 {
        let conn = pool.get()?;
        for (i, sql) in QUERIES.iter().enumerate() {
            let mut stmt = conn.prepare_statement(sql)?;
            stmt.bind(1, Arg::Int(i as i32 + 1))?;
            stmt.execute()?;
            // Closing parks the statement in the cache if there is room.
            stmt.close()?;
        }

        let store = conn
            .connection()?
            .extensions()
            .get::<ConnectionStore>()
            .expect("store is created on checkout");
        let cached = pool
            .extensions()
            .get::<AdmissionCounter>()
            .map_or(0, |c| c.get());
        println!(
            "Round {round}: prepared {} so far, {} cached ({} hits, {} misses)",
            log.prepared_count(),
            cached,
            store.hits(),
            store.misses()
        );
    }

    println!("\nOnly two statements fit in the cache, so the third is prepared every round.");

    pool.close();
    println!(
        "Pool closed: {} statements closed, {} connections closed",
        log.closed_statements().len(),
        log.closed_connections()
    );

    Ok(())
}
