//! Driver-level abstractions.
//!
//! The pool never talks to a database directly. A [`Connector`] produces
//! physical [`Connection`]s, which in turn produce [`Statement`] handles.
//! All three are opaque resources as far as the pool is concerned.

use std::fmt;

use crate::error::DriverError;

/// An argument passed to a connection-level call such as `prepareStatement`.
///
/// The first argument of a prepare call is the statement text; the rest are
/// driver flags (generated-key mode, column indexes, column names, result
/// set type and so on). Argument lists compare element-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    /// A string argument, usually SQL text.
    Text(String),
    /// An integer flag.
    Int(i32),
    /// An array of integers, e.g. generated-key column indexes.
    Ints(Vec<i32>),
    /// An array of strings, e.g. generated-key column names.
    Texts(Vec<String>),
}

impl Arg {
    /// Get the string value if this is a [`Arg::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Ints(v) => write!(f, "{v:?}"),
            Self::Texts(v) => write!(f, "{v:?}"),
        }
    }
}

/// A result set produced by executing a statement.
pub trait ResultSet: Send {
    /// Whether the result set has been closed.
    fn is_closed(&self) -> bool;

    /// Close the result set and release its cursor.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// A driver-level statement handle.
pub trait Statement: Send {
    /// Bind a parameter (1-based index).
    fn bind(&mut self, index: usize, value: Arg) -> Result<(), DriverError>;

    /// Execute the statement, returning the affected row count.
    fn execute(&mut self) -> Result<u64, DriverError>;

    /// The current result set, if the last execution produced one.
    fn result_set(&mut self) -> Option<&mut dyn ResultSet>;

    /// Clear all bound parameters.
    fn clear_parameters(&mut self) -> Result<(), DriverError>;

    /// Release the statement.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Whether the statement has been closed.
    fn is_closed(&self) -> bool;
}

/// A physical database connection.
pub trait Connection: Send {
    /// Prepare a statement. `args[0]` is the SQL text.
    fn prepare_statement(&mut self, args: &[Arg]) -> Result<Box<dyn Statement>, DriverError>;

    /// Prepare a stored procedure call. `args[0]` is the call text.
    fn prepare_call(&mut self, args: &[Arg]) -> Result<Box<dyn Statement>, DriverError>;

    /// Create an unprepared statement.
    fn create_statement(&mut self) -> Result<Box<dyn Statement>, DriverError>;

    /// Lightweight liveness check.
    fn is_valid(&self) -> bool;

    /// Close the physical connection.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Produces physical connections for a pool.
pub trait Connector: Send + Sync {
    /// Open a new physical connection.
    fn connect(&self) -> Result<Box<dyn Connection>, DriverError>;
}

impl<F> Connector for F
where
    F: Fn() -> Result<Box<dyn Connection>, DriverError> + Send + Sync,
{
    fn connect(&self) -> Result<Box<dyn Connection>, DriverError> {
        self()
    }
}
