//! API Configuration
//!
//! Configuration types for the session facade.

use serde::{Deserialize, Serialize};

use super::error::{SessionError, SessionResult};
use crate::auth::ClientInfo;
use crate::connection::BackoffConfig;
use crate::network::{Endpoint, PinnedKey};

/// Configuration for a [`Session`](super::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Server address.
    pub endpoint: Endpoint,

    /// Client metadata sent in the connection payload.
    pub client: ClientInfo,

    /// Reconnect backoff tuning.
    pub backoff: BackoffConfig,

    /// Raise a near-expiry signal when the server reports fewer remaining
    /// days than this.
    pub expiry_warning_days: u32,

    /// Accepted server static key fingerprints. Empty disables pinning.
    pub pinned_keys: Vec<PinnedKey>,

    /// Retry budget for requests built by the session's helpers.
    pub default_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            endpoint: Endpoint::default(),
            client: ClientInfo::default(),
            backoff: BackoffConfig::default(),
            expiry_warning_days: 14,
            pinned_keys: Vec::new(),
            default_retries: 1,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration for the given server.
    pub fn with_endpoint(host: impl Into<String>, port: u16) -> Self {
        SessionConfig {
            endpoint: Endpoint::new(host, port),
            ..Default::default()
        }
    }

    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> SessionResult<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| SessionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the client metadata.
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Sets the reconnect backoff.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the near-expiry warning threshold in days.
    pub fn with_expiry_warning_days(mut self, days: u32) -> Self {
        self.expiry_warning_days = days;
        self
    }

    /// Adds an accepted server key fingerprint.
    pub fn with_pinned_key(mut self, pin: PinnedKey) -> Self {
        self.pinned_keys.push(pin);
        self
    }

    /// Sets the default retry budget.
    pub fn with_default_retries(mut self, retries: u32) -> Self {
        self.default_retries = retries;
        self
    }

    /// Checks the values a session cannot run with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.endpoint.host.is_empty() {
            return Err(SessionError::Configuration("endpoint host is empty".into()));
        }
        if self.endpoint.port == 0 {
            return Err(SessionError::Configuration("endpoint port is 0".into()));
        }
        if self.backoff.max_delay_ms == 0 {
            return Err(SessionError::Configuration(
                "backoff max_delay_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
