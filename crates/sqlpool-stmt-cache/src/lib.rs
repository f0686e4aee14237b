//! # sqlpool-stmt-cache
//!
//! Prepared and callable statement cache for [`sqlpool`].
//!
//! Preparing a statement costs a round-trip to the server. This crate adds
//! a [`StatementCache`] interceptor to a pool's chain that keeps closed
//! statements open on their physical connection and hands them out again
//! when the same statement is prepared later.
//!
//! ## Behavior
//!
//! - Statements are keyed by operation (`prepareStatement` or
//!   `prepareCall`) plus the full argument list, so driver flags are part of
//!   the key.
//! - A cached statement belongs to exactly one connection and is handed to
//!   at most one caller at a time.
//! - The total number of cached statements is bounded per pool, shared by
//!   every connection.
//! - Statements are reset (open result set closed, parameters cleared)
//!   before being cached. A statement that cannot be reset or cached is
//!   closed; callers never see a caching failure.
//! - All cached statements of a connection are closed before the connection
//!   itself.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use sqlpool::{InterceptorDefinition, Pool, PoolConfig};
//! use sqlpool_stmt_cache::StatementCacheFactory;
//!
//! let config = PoolConfig::new().interceptor(
//!     InterceptorDefinition::new(Arc::new(StatementCacheFactory::new()))
//!         .property("prepared", "true")
//!         .property("callable", "false")
//!         .property("max", "50"),
//! );
//! let pool = Pool::new(config, connector)?;
//!
//! let conn = pool.get()?;
//! let mut stmt = conn.prepare_statement("SELECT name FROM users WHERE id = ?")?;
//! stmt.bind(1, 42.into())?;
//! stmt.execute()?;
//! drop(stmt); // parked in the cache
//!
//! let again = conn.prepare_statement("SELECT name FROM users WHERE id = ?")?; // reused
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod counter;
pub mod error;
pub mod key;
pub mod statement;
pub mod stats;
pub mod store;

pub use cache::{StatementCache, StatementCacheFactory};
pub use config::{DEFAULT_MAX_CACHE_SIZE, StatementCacheConfig};
pub use counter::AdmissionCounter;
pub use error::{CacheError, RejectReason, Rejected};
pub use key::{CacheKey, StatementKind};
pub use statement::{CachedStatement, DefaultStatementFactory, StatementFacade, StatementFactory};
pub use stats::CacheStats;
pub use store::ConnectionStore;
