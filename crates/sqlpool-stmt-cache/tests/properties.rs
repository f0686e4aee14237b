//! Property tests for cache keys and pool-wide admission.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use proptest::prelude::*;
use sqlpool::{Arg, Interceptor, Method, Pool, PoolConfig};
use sqlpool_stmt_cache::{AdmissionCounter, ConnectionStore, StatementCache, StatementCacheConfig};
use sqlpool_testing::DriverLog;

fn args(sql: &str, flags: &[i32]) -> Vec<Arg> {
    std::iter::once(Arg::from(sql))
        .chain(flags.iter().copied().map(Arg::Int))
        .collect()
}

#[derive(Debug, Clone)]
enum Op {
    Admit { conn: usize, sql: usize },
    Evict { conn: usize, sql: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..6usize).prop_map(|(conn, sql)| Op::Admit { conn, sql }),
        (0..3usize, 0..6usize).prop_map(|(conn, sql)| Op::Evict { conn, sql }),
    ]
}

proptest! {
    #[test]
    fn equal_calls_produce_equal_keys(
        sql in "[A-Za-z0-9 ?=*]{1,40}",
        flags in proptest::collection::vec(any::<i32>(), 0..3),
        callable in any::<bool>(),
    ) {
        let config = StatementCacheConfig::new().cache_callable(true);
        let method = if callable { Method::PrepareCall } else { Method::PrepareStatement };

        let a = config.classify(method, &args(&sql, &flags));
        let b = config.classify(method, &args(&sql, &flags));
        prop_assert!(a.is_some());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn differing_calls_produce_different_keys(
        sql_a in "[a-z]{1,12}",
        sql_b in "[a-z]{1,12}",
        flags_a in proptest::collection::vec(0..4i32, 0..3),
        flags_b in proptest::collection::vec(0..4i32, 0..3),
    ) {
        let config = StatementCacheConfig::new();
        let a = config.classify(Method::PrepareStatement, &args(&sql_a, &flags_a)).unwrap();
        let b = config.classify(Method::PrepareStatement, &args(&sql_b, &flags_b)).unwrap();
        prop_assert_eq!(a == b, sql_a == sql_b && flags_a == flags_b);
    }

    #[test]
    fn counter_tracks_cached_statements(
        max in 0..5usize,
        ops in proptest::collection::vec(op(), 1..60),
    ) {
        let log = DriverLog::new();
        let pool = Pool::new(PoolConfig::new().max_connections(3), log.connector()).unwrap();
        let guards: Vec<_> = (0..3).map(|_| pool.get().unwrap()).collect();
        let caches: Vec<StatementCache> = guards
            .iter()
            .map(|guard| {
                let cache = StatementCache::new(StatementCacheConfig::new().max_cache_size(max));
                cache.pool_started(&pool);
                cache.connection_attached(&pool, guard.connection().unwrap());
                cache
            })
            .collect();
        let stores: Vec<Arc<ConnectionStore>> = guards
            .iter()
            .map(|g| g.connection().unwrap().extensions().get::<ConnectionStore>().unwrap())
            .collect();
        let counter = pool.extensions().get::<AdmissionCounter>().unwrap();

        for op in ops {
            match op {
                Op::Admit { conn, sql } => {
                    let sql = format!("SELECT {sql}");
                    let cache = &caches[conn];
                    let key = cache.classify(Method::PrepareStatement, &[Arg::from(sql.as_str())]);
                    let _ = cache.admit(cache.track(key, Box::new(log.statement(&sql))));
                }
                Op::Evict { conn, sql } => {
                    let cache = &caches[conn];
                    let key = cache
                        .classify(Method::PrepareStatement, &[Arg::from(format!("SELECT {sql}"))])
                        .unwrap();
                    let _ = cache.evict(&key);
                }
            }

            let cached: usize = stores.iter().map(|s| s.len()).sum();
            prop_assert!(counter.get() <= max);
            prop_assert_eq!(counter.get(), cached);
        }
    }
}
