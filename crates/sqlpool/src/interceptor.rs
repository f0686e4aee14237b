//! Interceptor chain.
//!
//! Every call made through a pooled connection passes through an ordered
//! chain of [`Interceptor`]s before reaching the physical connection. An
//! interceptor either answers the call itself or hands it to the rest of
//! the chain through [`Next::proceed`].
//!
//! ```text
//! guard.prepare_statement(sql)
//!   -> interceptor[0].invoke(call, next)
//!     -> interceptor[1].invoke(call, next)
//!       -> physical connection
//! ```
//!
//! Interceptors also receive pool lifecycle events. One instance is created
//! per physical connection (the chain is reused across checkouts), plus one
//! pool-level instance that receives `pool_started` and `pool_closed`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::driver::{Arg, Statement};
use crate::error::PoolError;
use crate::pool::{Pool, PooledConnection};

/// A connection-level operation that can be intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `prepareStatement(sql, ...)`.
    PrepareStatement,
    /// `prepareCall(sql, ...)`.
    PrepareCall,
    /// `createStatement()`.
    CreateStatement,
    /// `isValid()`.
    IsValid,
}

impl Method {
    /// The operation name as seen by interceptors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrepareStatement => "prepareStatement",
            Self::PrepareCall => "prepareCall",
            Self::CreateStatement => "createStatement",
            Self::IsValid => "isValid",
        }
    }

    /// Whether this operation prepares a statement from SQL text.
    #[must_use]
    pub fn is_prepare(&self) -> bool {
        matches!(self, Self::PrepareStatement | Self::PrepareCall)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepareStatement" => Ok(Self::PrepareStatement),
            "prepareCall" => Ok(Self::PrepareCall),
            "createStatement" => Ok(Self::CreateStatement),
            "isValid" => Ok(Self::IsValid),
            other => Err(PoolError::InvalidArgument(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

/// A call travelling through the interceptor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    method: Method,
    args: Vec<Arg>,
}

impl Call {
    /// Create a call.
    pub fn new(method: Method, args: impl Into<Vec<Arg>>) -> Self {
        Self {
            method,
            args: args.into(),
        }
    }

    /// The invoked operation.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The call arguments, in order.
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// The SQL text, if the first argument is a string.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        self.args.first().and_then(Arg::as_text)
    }
}

/// The result of a call.
pub enum Response {
    /// A statement handle.
    Statement(Box<dyn Statement>),
    /// A boolean result.
    Bool(bool),
}

impl Response {
    /// Unwrap a statement response.
    pub fn into_statement(self) -> Result<Box<dyn Statement>, PoolError> {
        match self {
            Self::Statement(stmt) => Ok(stmt),
            Self::Bool(_) => Err(PoolError::InvalidArgument(
                "expected a statement response".into(),
            )),
        }
    }

    /// Unwrap a boolean response.
    pub fn into_bool(self) -> Result<bool, PoolError> {
        match self {
            Self::Bool(b) => Ok(b),
            Self::Statement(_) => Err(PoolError::InvalidArgument(
                "expected a boolean response".into(),
            )),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Statement(_) => f.write_str("Response::Statement(..)"),
            Self::Bool(b) => write!(f, "Response::Bool({b})"),
        }
    }
}

/// A link in a connection's interceptor chain.
///
/// All hooks have no-op defaults; `invoke` defaults to passing the call on.
pub trait Interceptor: Send + Sync {
    /// Name used in logs and for uniqueness checks.
    fn name(&self) -> &str;

    /// Handle a call, or delegate it with `next.proceed(call)`.
    fn invoke(&self, call: &Call, next: Next<'_>) -> Result<Response, PoolError> {
        next.proceed(call)
    }

    /// The pool has started.
    fn pool_started(&self, _pool: &Pool) {}

    /// The pool has closed.
    fn pool_closed(&self, _pool: &Pool) {}

    /// The connection this instance belongs to has been checked out.
    fn connection_attached(&self, _pool: &Pool, _connection: &PooledConnection) {}

    /// The connection this instance belongs to is being torn down.
    fn connection_detached(&self) {}

    /// The physical connection is about to be closed.
    ///
    /// Runs before the connection itself is closed.
    fn disconnected(&self, _pool: &Pool, _connection: &PooledConnection, _finalizing: bool) {}
}

/// The remainder of an interceptor chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    connection: &'a PooledConnection,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Interceptor>], connection: &'a PooledConnection) -> Self {
        Self { chain, connection }
    }

    /// Pass the call to the next interceptor, or to the physical connection
    /// at the end of the chain.
    pub fn proceed(self, call: &Call) -> Result<Response, PoolError> {
        match self.chain.split_first() {
            Some((head, rest)) => head.invoke(call, Next::new(rest, self.connection)),
            None => self.connection.dispatch(call),
        }
    }

    /// The connection the call was made on.
    #[must_use]
    pub fn connection(&self) -> &'a PooledConnection {
        self.connection
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len())
            .field("connection", &self.connection.id())
            .finish()
    }
}

/// Builds interceptor instances from configured properties.
pub trait InterceptorFactory: Send + Sync {
    /// Interceptor name.
    fn name(&self) -> &str;

    /// Create a new instance.
    fn create(&self, properties: &InterceptorProperties) -> Result<Arc<dyn Interceptor>, PoolError>;
}

/// Properties configured for one interceptor, e.g. `prepared=true,max=50`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptorProperties {
    values: HashMap<String, String>,
}

impl InterceptorProperties {
    /// Create an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated `key=value` list.
    pub fn parse(input: &str) -> Result<Self, PoolError> {
        let mut properties = Self::new();

        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part.split_once('=').ok_or_else(|| {
                PoolError::Configuration(format!("invalid interceptor property: {part}"))
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(PoolError::Configuration(format!(
                    "interceptor property without a name: {part}"
                )));
            }
            properties
                .values
                .insert(key.to_string(), value.trim().to_string());
        }

        Ok(properties)
    }

    /// Set a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Raw property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Read a boolean property. Values other than `true`/`false`
    /// (case-insensitive) yield `default`.
    #[must_use]
    pub fn value_as_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    /// Read an integer property. Unparseable values yield `default`.
    #[must_use]
    pub fn value_as_int(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no properties are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A configured interceptor: its factory plus properties.
#[derive(Clone)]
pub struct InterceptorDefinition {
    factory: Arc<dyn InterceptorFactory>,
    properties: InterceptorProperties,
}

impl InterceptorDefinition {
    /// Create a definition with no properties.
    pub fn new(factory: Arc<dyn InterceptorFactory>) -> Self {
        Self {
            factory,
            properties: InterceptorProperties::new(),
        }
    }

    /// Replace the properties.
    #[must_use]
    pub fn with_properties(mut self, properties: InterceptorProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Set a single property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties = self.properties.with(key, value);
        self
    }

    /// Interceptor name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.factory.name()
    }

    /// Configured properties.
    #[must_use]
    pub fn properties(&self) -> &InterceptorProperties {
        &self.properties
    }

    /// Create a fresh instance.
    pub fn instantiate(&self) -> Result<Arc<dyn Interceptor>, PoolError> {
        self.factory.create(&self.properties)
    }
}

impl fmt::Debug for InterceptorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorDefinition")
            .field("name", &self.name())
            .field("properties", &self.properties)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip_names() {
        for method in [
            Method::PrepareStatement,
            Method::PrepareCall,
            Method::CreateStatement,
            Method::IsValid,
        ] {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
        assert!("executeQuery".parse::<Method>().is_err());
    }

    #[test]
    fn test_method_is_prepare() {
        assert!(Method::PrepareStatement.is_prepare());
        assert!(Method::PrepareCall.is_prepare());
        assert!(!Method::CreateStatement.is_prepare());
    }

    #[test]
    fn test_call_sql() {
        let call = Call::new(Method::PrepareStatement, vec![Arg::from("SELECT 1"), Arg::Int(1)]);
        assert_eq!(call.sql(), Some("SELECT 1"));

        let call = Call::new(Method::PrepareStatement, vec![Arg::Int(1)]);
        assert_eq!(call.sql(), None);

        let call = Call::new(Method::CreateStatement, Vec::new());
        assert_eq!(call.sql(), None);
    }

    #[test]
    fn test_properties_parse() {
        let props = InterceptorProperties::parse("prepared=true, callable = false ,max=20").unwrap();
        assert_eq!(props.len(), 3);
        assert!(props.value_as_bool("prepared", false));
        assert!(!props.value_as_bool("callable", true));
        assert_eq!(props.value_as_int("max", 50), 20);
    }

    #[test]
    fn test_properties_defaults_on_bad_values() {
        let props = InterceptorProperties::parse("prepared=yes,max=-1").unwrap();
        assert!(props.value_as_bool("prepared", true));
        assert!(!props.value_as_bool("prepared", false));
        assert_eq!(props.value_as_int("max", 50), 50);
        assert_eq!(props.value_as_int("missing", 7), 7);
    }

    #[test]
    fn test_properties_parse_rejects_malformed() {
        assert!(InterceptorProperties::parse("prepared").is_err());
        assert!(InterceptorProperties::parse("=true").is_err());
        assert!(InterceptorProperties::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_response_unwrap() {
        assert!(Response::Bool(true).into_bool().unwrap());
        assert!(Response::Bool(true).into_statement().is_err());
    }
}
