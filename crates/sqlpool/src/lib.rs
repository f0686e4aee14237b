//! # sqlpool
//!
//! Synchronous database connection pool with an explicit interceptor chain.
//!
//! Every call made on a pooled connection (`prepareStatement`,
//! `prepareCall`, ...) travels through an ordered list of
//! [`Interceptor`]s before reaching the physical connection. Interceptors
//! also receive pool lifecycle events, which lets components such as a
//! statement cache keep per-pool and per-connection state that lives
//! exactly as long as the pool or connection does.
//!
//! ## Features
//!
//! - Configurable pool size, idle timeout and maximum lifetime
//! - Validation on checkout
//! - Ordered interceptor chain configured with `key=value` properties
//! - Typed pool-scoped and connection-scoped attributes ([`Extensions`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .max_connections(20)
//!     .idle_timeout(Duration::from_secs(300));
//!
//! let pool = Pool::new(config, connector)?;
//! let conn = pool.get()?;
//! let mut stmt = conn.prepare_statement("SELECT 1")?;
//! stmt.execute()?;
//! // Connection automatically returned to pool on drop
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod driver;
pub mod error;
pub mod extensions;
pub mod interceptor;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use driver::{Arg, Connection, Connector, ResultSet, Statement};
pub use error::{DriverError, PoolError};
pub use extensions::Extensions;
pub use interceptor::{
    Call, Interceptor, InterceptorDefinition, InterceptorFactory, InterceptorProperties, Method,
    Next, Response,
};
pub use lifecycle::{ConnectionMetadata, ConnectionState};
pub use pool::{Pool, PoolStatus, PooledConnection, PooledConnectionGuard};
