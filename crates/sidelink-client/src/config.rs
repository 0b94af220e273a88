use reqwest::Url;
use sidelink_common::helpers::env_parse;
use sidelink_common::{Error, Result};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_RETRY_BACKOFF: Duration = Duration::from_secs(8);

/// Signaling client settings.
///
/// Env overrides: SIDELINK_SERVER_URL, SIDELINK_POLL_INTERVAL_MS,
/// SIDELINK_REQUEST_TIMEOUT_MS, SIDELINK_MAX_ATTEMPTS,
/// SIDELINK_ANSWER_POLL_FAILURE_LIMIT.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the signaling relay.
    pub server_url: String,
    /// Cadence of every poller (offers, answers, candidates).
    pub poll_interval: Duration,
    /// Upper bound on a single request/response exchange.
    pub request_timeout: Duration,
    /// Consecutive failed posts before a session gives up.
    pub max_attempts: u32,
    /// First delay between retried posts; doubles up to `max_retry_backoff`.
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
    /// Consecutive failed answer polls before an offerer gives up. `None` polls forever.
    pub answer_poll_failure_limit: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_retry_backoff: DEFAULT_MAX_RETRY_BACKOFF,
            answer_poll_failure_limit: None,
        }
    }
}

impl ClientConfig {
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Defaults, overridden by any well-formed environment variables.
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(url) = std::env::var("SIDELINK_SERVER_URL") {
            c.server_url = url;
        }
        if let Some(ms) = env_parse::<u64>("SIDELINK_POLL_INTERVAL_MS") {
            c.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("SIDELINK_REQUEST_TIMEOUT_MS") {
            c.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("SIDELINK_MAX_ATTEMPTS") {
            c.max_attempts = n;
        }
        if let Some(n) = env_parse::<u32>("SIDELINK_ANSWER_POLL_FAILURE_LIMIT") {
            c.answer_poll_failure_limit = Some(n);
        }
        c
    }

    /// The relay base URL, parsed. Must be http(s) with a host.
    pub fn server_url(&self) -> Result<Url> {
        let url = Url::parse(self.server_url.trim()).map_err(|e| {
            Error::config(format!("invalid server url {:?}: {e}", self.server_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "server url must be http(s), got {:?}",
                self.server_url
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::config(format!(
                "server url has no host: {:?}",
                self.server_url
            )));
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        self.server_url()?;
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be non-zero"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config("max attempts must be at least 1"));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based), doubling and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_retry_backoff)
    }
}
