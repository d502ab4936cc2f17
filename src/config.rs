//! Connection configuration.
//!
//! A [`ConnectionConfig`] is built once, validated, and then shared read-only
//! by the session for its whole lifetime.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use mythwire_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::builder("mythbox.local", "91 BuzzOff")
//!     .announce_name("kitchen")
//!     .block_shutdown(true)
//!     .receive_timeout(Duration::from_secs(2))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.port, 6543);
//! assert_eq!(config.socket_timeout(), Duration::from_secs(2));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MythwireError, Result};
use crate::protocol::{announce_monitor_command, encode, proto_version_command};

/// Default backend control port.
pub const DEFAULT_PORT: u16 = 6543;

/// Default socket timeout in seconds (connect and send).
pub const DEFAULT_RECEIVE_TIMEOUT_SECONDS: f64 = 4.0;

/// Largest accepted socket timeout in seconds (one day).
pub const MAX_RECEIVE_TIMEOUT_SECONDS: f64 = 86_400.0;

/// Name announced when the local host name cannot be determined.
pub const FALLBACK_ANNOUNCE_NAME: &str = "localhost";

/// Parameters of one monitor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Backend host name or address.
    pub host: String,
    /// Backend control port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Opaque protocol version token sent in the handshake.
    pub protocol_version_tag: String,
    /// Name announced with `ANN Monitor`.
    #[serde(default = "local_hostname")]
    pub announce_name: String,
    /// Ask the backend to defer shutdown while connected.
    #[serde(default)]
    pub block_shutdown: bool,
    /// Socket timeout for connect and send, in seconds.
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_seconds: f64,
    /// Log every raw payload sent and received.
    #[serde(default)]
    pub debug: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_receive_timeout() -> f64 {
    DEFAULT_RECEIVE_TIMEOUT_SECONDS
}

/// Local host name, or [`FALLBACK_ANNOUNCE_NAME`].
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty() && !h.contains(char::is_whitespace))
        .unwrap_or_else(|| FALLBACK_ANNOUNCE_NAME.to_string())
}

impl ConnectionConfig {
    /// Start building a configuration.
    pub fn builder(host: impl Into<String>, protocol_version_tag: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host, protocol_version_tag)
    }

    /// Load and validate a configuration from JSON.
    ///
    /// Only `host` and `protocol_version_tag` are required.
    ///
    /// ```
    /// use mythwire_client::ConnectionConfig;
    ///
    /// let config = ConnectionConfig::from_json(
    ///     r#"{"host": "10.0.0.5", "protocol_version_tag": "91 BuzzOff", "announce_name": "den"}"#,
    /// ).unwrap();
    /// assert_eq!(config.announce_name, "den");
    /// assert!(!config.block_shutdown);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket timeout as a `Duration`.
    ///
    /// Out-of-range values saturate at [`MAX_RECEIVE_TIMEOUT_SECONDS`];
    /// `validate()` rejects them up front.
    pub fn socket_timeout(&self) -> Duration {
        let max = Duration::from_secs_f64(MAX_RECEIVE_TIMEOUT_SECONDS);
        Duration::try_from_secs_f64(self.receive_timeout_seconds)
            .map_or(max, |timeout| timeout.min(max))
    }

    /// `host:port` for logging and connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check every field invariant.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MythwireError::Config("host must not be empty".to_string()));
        }

        if self.port == 0 {
            return Err(MythwireError::Config("port must be 1-65535".to_string()));
        }

        if self.protocol_version_tag.trim().is_empty() {
            return Err(MythwireError::Config(
                "protocol_version_tag must not be empty".to_string(),
            ));
        }

        if self.announce_name.is_empty() || self.announce_name.contains(char::is_whitespace) {
            return Err(MythwireError::Config(format!(
                "announce_name {:?} must be a single non-empty word",
                self.announce_name
            )));
        }

        if !self.receive_timeout_seconds.is_finite()
            || self.receive_timeout_seconds <= 0.0
            || self.receive_timeout_seconds > MAX_RECEIVE_TIMEOUT_SECONDS
        {
            return Err(MythwireError::Config(format!(
                "receive_timeout_seconds must be in (0, {}], got {}",
                MAX_RECEIVE_TIMEOUT_SECONDS, self.receive_timeout_seconds
            )));
        }

        encode(proto_version_command(&self.protocol_version_tag).as_bytes())?;
        encode(announce_monitor_command(&self.announce_name).as_bytes())?;

        Ok(())
    }
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: ConnectionConfig,
}

impl ConfigBuilder {
    fn new(host: impl Into<String>, protocol_version_tag: impl Into<String>) -> Self {
        Self {
            config: ConnectionConfig {
                host: host.into(),
                port: DEFAULT_PORT,
                protocol_version_tag: protocol_version_tag.into(),
                announce_name: local_hostname(),
                block_shutdown: false,
                receive_timeout_seconds: DEFAULT_RECEIVE_TIMEOUT_SECONDS,
                debug: false,
            },
        }
    }

    /// Set the backend control port.
    ///
    /// Default: 6543
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the name announced to the backend.
    ///
    /// Default: the local host name
    pub fn announce_name(mut self, name: impl Into<String>) -> Self {
        self.config.announce_name = name.into();
        self
    }

    /// Ask the backend to defer shutdown while connected.
    pub fn block_shutdown(mut self, block: bool) -> Self {
        self.config.block_shutdown = block;
        self
    }

    /// Set the socket timeout for connect and send.
    ///
    /// Default: 4 seconds
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.config.receive_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Log raw payloads.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<ConnectionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConfigBuilder {
        ConnectionConfig::builder("mythbox", "91 BuzzOff").announce_name("den")
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.host, "mythbox");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.protocol_version_tag, "91 BuzzOff");
        assert!(!config.block_shutdown);
        assert!(!config.debug);
        assert_eq!(config.socket_timeout(), Duration::from_secs(4));
        assert_eq!(config.address(), "mythbox:6543");
    }

    #[test]
    fn test_builder_configuration() {
        let config = builder()
            .port(16543)
            .block_shutdown(true)
            .receive_timeout(Duration::from_millis(1500))
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.port, 16543);
        assert!(config.block_shutdown);
        assert!(config.debug);
        assert_eq!(config.receive_timeout_seconds, 1.5);
    }

    #[test]
    fn test_default_announce_name_is_single_word() {
        let name = local_hostname();
        assert!(!name.is_empty());
        assert!(!name.contains(char::is_whitespace));
    }

    #[test]
    fn test_validation_failures() {
        assert!(ConnectionConfig::builder("", "91 BuzzOff").build().is_err());
        assert!(ConnectionConfig::builder("h", " ").build().is_err());
        assert!(builder().port(0).build().is_err());
        assert!(builder().announce_name("").build().is_err());
        assert!(builder().announce_name("living room").build().is_err());
        assert!(builder()
            .receive_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_validation_rejects_nan_timeout() {
        let mut config = builder().build().unwrap();
        config.receive_timeout_seconds = f64::NAN;

        let result = config.validate();
        assert!(matches!(result, Err(MythwireError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_huge_timeout() {
        let result = builder().receive_timeout(Duration::MAX).build();
        assert!(matches!(result, Err(MythwireError::Config(_))));

        let result = builder()
            .receive_timeout(Duration::from_secs(86_401))
            .build();
        assert!(matches!(result, Err(MythwireError::Config(_))));

        let config = builder()
            .receive_timeout(Duration::from_secs(86_400))
            .build()
            .unwrap();
        assert_eq!(config.socket_timeout(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_from_json_rejects_huge_timeout() {
        let result = ConnectionConfig::from_json(
            r#"{"host": "h", "protocol_version_tag": "t", "receive_timeout_seconds": 1e20}"#,
        );
        assert!(matches!(result, Err(MythwireError::Config(_))));
    }

    #[test]
    fn test_socket_timeout_never_panics() {
        let mut config = builder().build().unwrap();

        config.receive_timeout_seconds = 1e20;
        assert_eq!(config.socket_timeout(), Duration::from_secs(86_400));

        config.receive_timeout_seconds = f64::NAN;
        assert_eq!(config.socket_timeout(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_from_json_full() {
        let config = ConnectionConfig::from_json(
            r#"{
                "host": "10.0.0.5",
                "port": 6544,
                "protocol_version_tag": "77 WindMark",
                "announce_name": "KODI",
                "block_shutdown": true,
                "receive_timeout_seconds": 2.5,
                "debug": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.port, 6544);
        assert_eq!(config.announce_name, "KODI");
        assert!(config.block_shutdown);
        assert_eq!(config.socket_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_from_json_missing_required() {
        let result = ConnectionConfig::from_json(r#"{"host": "10.0.0.5"}"#);
        assert!(matches!(result, Err(MythwireError::Json(_))));
    }

    #[test]
    fn test_from_json_invalid_value() {
        let result = ConnectionConfig::from_json(
            r#"{"host": "h", "protocol_version_tag": "t", "receive_timeout_seconds": -1}"#,
        );
        assert!(matches!(result, Err(MythwireError::Config(_))));
    }
}
