//! Centralized configuration for func-testkit.
//!
//! Constants live on unit structs grouped by concern. [`FactorySettings`] is
//! the caller-facing surface: every knob a test author can turn on a
//! [`FunctionApplicationFactory`](crate::FunctionApplicationFactory).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Defaults for the supervised host process.
pub struct HostConfig;

impl HostConfig {
    pub const FUNC_COMMAND: &'static str = "func";
    pub const START_COMMAND: &'static str = "start";
    pub const DEFAULT_PORT: u16 = 7071;
    pub const PORT_KEYS: [&'static str; 2] = ["p", "port"];
    pub const PORT_RAW_KEY: &'static str = "--port";
    pub const HTTPS_KEY: &'static str = "useHttps";
    pub const VERBOSE_KEY: &'static str = "verbose";

    pub const STARTUP_DELAY: Duration = Duration::from_secs(2);
    pub const SHUTDOWN_DELAY: Duration = Duration::from_secs(1);
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const LOCALHOST: &'static str = "localhost";
    pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(100);
    pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);
    pub const HEALTH_CHECK_MAX_ATTEMPTS: u32 = 30;
    pub const HEALTH_CHECK_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Caller-facing settings for a function host under test.
///
/// Deserializes from kebab-case keys with durations in milliseconds, so a
/// test suite can keep its harness settings next to its fixtures:
///
/// ```json
/// { "startup-delay": 5000, "health-check-endpoint": "/api/health" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FactorySettings {
    /// Max wait before declaring the host started absent any other signal.
    #[serde(with = "millis")]
    pub startup_delay: Duration,
    /// Max wait during stop for the host to exit.
    #[serde(with = "millis")]
    pub shutdown_delay: Duration,
    /// Relative path polled with `GET` until it answers with a success status.
    pub health_check_endpoint: Option<String>,
    /// Number of health-check attempts before startup is declared failed.
    pub health_check_max_attempts: u32,
    /// Timeout applied to clients returned by `create_client`.
    #[serde(with = "millis")]
    pub default_client_timeout: Duration,
    /// Explicit path to the `func` executable; bypasses PATH discovery.
    pub executable_path: Option<PathBuf>,
    /// Log the launch command line and port substitutions at info level.
    pub verbose: bool,
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self {
            startup_delay: HostConfig::STARTUP_DELAY,
            shutdown_delay: HostConfig::SHUTDOWN_DELAY,
            health_check_endpoint: None,
            health_check_max_attempts: NetworkConfig::HEALTH_CHECK_MAX_ATTEMPTS,
            default_client_timeout: NetworkConfig::DEFAULT_CLIENT_TIMEOUT,
            executable_path: None,
            verbose: false,
        }
    }
}

impl FactorySettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the startup delay.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Set the shutdown delay.
    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    /// Enable health-check polling against the given relative path.
    pub fn with_health_check_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_check_endpoint = Some(endpoint.into());
        self
    }

    /// Set the health-check attempt budget.
    pub fn with_health_check_max_attempts(mut self, attempts: u32) -> Self {
        self.health_check_max_attempts = attempts;
        self
    }

    /// Set the default client timeout.
    pub fn with_default_client_timeout(mut self, timeout: Duration) -> Self {
        self.default_client_timeout = timeout;
        self
    }

    /// Set an explicit executable path.
    pub fn with_executable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Enable or disable verbose logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
