//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;
use crate::interceptor::InterceptorDefinition;

/// Default pool name.
pub const DEFAULT_POOL_NAME: &str = "sqlpool";

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Pool name, used in logs.
    pub name: String,

    /// Maximum number of connections allowed.
    pub max_connections: u32,

    /// Time a connection can be idle before being evicted.
    pub idle_timeout: Duration,

    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,

    /// Whether to validate connections on checkout.
    pub test_on_checkout: bool,

    /// Interceptors applied to every connection, outermost first.
    pub interceptors: Vec<InterceptorDefinition>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_POOL_NAME.to_string(),
            max_connections: 10,
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            test_on_checkout: true,
            interceptors: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Enable or disable validating connections on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }

    /// Append an interceptor to the chain.
    #[must_use]
    pub fn interceptor(mut self, definition: InterceptorDefinition) -> Self {
        self.interceptors.push(definition);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        for (i, def) in self.interceptors.iter().enumerate() {
            if self.interceptors[..i].iter().any(|d| d.name() == def.name()) {
                return Err(PoolError::Configuration(format!(
                    "interceptor {} configured more than once",
                    def.name()
                )));
            }
        }
        Ok(())
    }
}
