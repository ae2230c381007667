//! Client configuration.
//!
//! [`Config`] is who we are and where the gateway lives. [`ClientOptions`]
//! holds the timing knobs; its defaults are the protocol's reference values.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CommsError, Result};
use crate::writer::DEFAULT_WRITE_TIMEOUT;

/// Default bound on dial + auth.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Default first reconnect delay.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(100);

/// Default reconnect delay ceiling.
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(10);

/// Bot credential presented in CONNECT.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// Short-lived bearer token.
    Token(String),
    /// Long-lived API key.
    ApiKey(String),
}

impl Credential {
    /// The secret as sent on the wire.
    pub fn secret(&self) -> &str {
        match self {
            Credential::Token(s) | Credential::ApiKey(s) => s,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(<redacted>)"),
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Identity and gateway address.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Gateway address (`ws://`, `wss://`, `http://` or `https://`).
    pub gateway_url: String,
    /// Bot identifier.
    pub bot_id: String,
    /// Token or API key.
    pub credential: Credential,
    /// Optional device identifier.
    #[serde(default)]
    pub device_id: Option<String>,
}

impl Config {
    /// Create a config without a device id.
    pub fn new(
        gateway_url: impl Into<String>,
        bot_id: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            bot_id: bot_id.into(),
            credential,
            device_id: None,
        }
    }

    /// Set the device id.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Reject configs that could never authenticate.
    pub fn validate(&self) -> Result<()> {
        if self.gateway_url.trim().is_empty() {
            return Err(CommsError::Protocol("gateway url is empty".to_string()));
        }
        if self.bot_id.trim().is_empty() {
            return Err(CommsError::Protocol("bot id is empty".to_string()));
        }
        if self.credential.secret().is_empty() {
            return Err(CommsError::Protocol("credential is empty".to_string()));
        }
        Ok(())
    }
}

/// Timing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bound on dial + auth for `connect`.
    pub connect_timeout: Duration,
    /// Deadline for each outbound write.
    pub write_timeout: Duration,
    /// PRESENCE heartbeat period.
    pub heartbeat_interval: Duration,
    /// First reconnect delay before jitter.
    pub reconnect_base: Duration,
    /// Reconnect delay ceiling before jitter.
    pub reconnect_cap: Duration,
    /// Bound on dial + auth for each reconnect attempt.
    pub reconnect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
            reconnect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
