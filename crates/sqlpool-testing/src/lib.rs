//! # sqlpool-testing
//!
//! Test infrastructure for sqlpool development.
//!
//! Provides an in-memory mock driver whose connections and statements
//! record every driver-level call in a shared [`DriverLog`], with switches
//! for injecting failures into close, clear-parameters and validation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlpool::{Pool, PoolConfig};
//! use sqlpool_testing::DriverLog;
//!
//! let log = DriverLog::new();
//! let pool = Pool::new(PoolConfig::new(), log.connector())?;
//! let conn = pool.get()?;
//! let mut stmt = conn.prepare_statement("SELECT 1")?;
//! stmt.execute()?;
//! assert_eq!(log.prepared_count(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_driver;

pub use mock_driver::{
    DriverEvent, DriverLog, MockConnection, MockConnector, MockResultSet, MockStatement,
};
