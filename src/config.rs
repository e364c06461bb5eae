//! Environment configuration

use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_PORT: u16 = 8100;

/// Process configuration, read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the analytics backend
    pub backend_url: String,
    /// Port for the local API
    pub port: u16,
    /// Credentials for logging in at startup
    pub email: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
    pub polling: PollConfig,
}

/// Intervals and failure budget for the processing pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub status_interval: Duration,
    pub log_interval: Duration,
    /// Consecutive poll failures tolerated before recovery kicks in
    pub max_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(1000),
            log_interval: Duration::from_millis(2000),
            max_failures: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = PollConfig::default();
        let millis = |key: &str, default: Duration| {
            var(key)
                .and_then(|v| v.parse().ok())
                .map_or(default, Duration::from_millis)
        };

        Self {
            backend_url: var("ANALYTICS_BACKEND_URL")
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            port: var("ANALYTICS_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            email: var("ANALYTICS_EMAIL").filter(|v| !v.is_empty()),
            password: var("ANALYTICS_PASSWORD").filter(|v| !v.is_empty()),
            request_timeout: var("ANALYTICS_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map_or(Duration::from_secs(30), Duration::from_secs),
            polling: PollConfig {
                status_interval: millis("ANALYTICS_STATUS_POLL_MS", defaults.status_interval),
                log_interval: millis("ANALYTICS_LOG_POLL_MS", defaults.log_interval),
                max_failures: var("ANALYTICS_MAX_POLL_FAILURES")
                    .and_then(|v| v.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.max_failures),
            },
        }
    }

    /// Both halves of the login, if configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.email.as_deref()?, self.password.as_deref()?))
    }
}
