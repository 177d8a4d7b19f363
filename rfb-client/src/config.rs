//! Configuration types for the VNC client.

use crate::engine::{Encoding, HasId};
use crate::errors::RfbClientError;
use rfb_pixelbuffer::PixelFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default VNC port (display :0).
pub const DEFAULT_PORT: u16 = 5900;

/// Complete VNC client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Display settings.
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server hostname or IP address.
    #[serde(default)]
    pub host: String,
    /// Server port (typically 5900 + display number).
    #[serde(default = "default_port")]
    pub port: u16,
    /// VNC password (if required).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Ask the server to keep other clients connected.
    #[serde(default = "default_true")]
    pub shared: bool,
    /// Transport connect timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            password: None,
            shared: default_true(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Pixel layout the client asks the server to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    /// 16-bit 5-6-5 RGB.
    Rgb565,
    /// 32-bit RGBA.
    Rgba8888,
    /// 32-bit BGRA.
    #[default]
    Bgra8888,
}

impl ColorFormat {
    /// Protocol description of this layout.
    #[must_use]
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            Self::Rgb565 => PixelFormat::rgb565(),
            Self::Rgba8888 => PixelFormat::rgba8888(),
            Self::Bgra8888 => PixelFormat::bgra8888(),
        }
    }
}

/// Display configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Preferred encodings in priority order.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<i32>,
    /// Pixel layout requested from the server; should match the host surface.
    #[serde(default)]
    pub color_format: ColorFormat,
}

fn default_encodings() -> Vec<i32> {
    Encoding::PREFERENCE_ORDER.iter().map(|e| e.id()).collect()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            encodings: default_encodings(),
            color_format: ColorFormat::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, RfbClientError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RfbClientError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RfbClientError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RfbClientError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String, RfbClientError> {
        toml::to_string_pretty(self)
            .map_err(|e| RfbClientError::Config(format!("cannot serialize config: {e}")))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), RfbClientError> {
        self.parameters().validate()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.connection.timeout_ms)
    }

    /// Connection parameters handed to the protocol engine.
    #[must_use]
    pub fn parameters(&self) -> ConnectionParameters {
        ConnectionParameters {
            host: self.connection.host.clone(),
            port: self.connection.port,
            password: self.connection.password.clone(),
            shared: self.connection.shared,
            timeout: self.timeout(),
            encodings: self.display.encodings.clone(),
            pixel_format: self.display.color_format.pixel_format(),
        }
    }
}

/// Builder for creating a `Config`.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the server hostname or IP address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.connection.host = host.into();
        self
    }

    /// Sets the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.connection.port = port;
        self
    }

    /// Sets the VNC password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.connection.password = Some(password.into());
        self
    }

    /// Sets the shared-session flag sent in ClientInit.
    #[must_use]
    pub fn shared(mut self, shared: bool) -> Self {
        self.config.connection.shared = shared;
        self
    }

    /// Sets the transport connect timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.connection.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the preferred encodings, highest priority first.
    #[must_use]
    pub fn encodings(mut self, encodings: impl IntoIterator<Item = Encoding>) -> Self {
        self.config.display.encodings = encodings.into_iter().map(|e| e.id()).collect();
        self
    }

    /// Sets the pixel layout requested from the server.
    #[must_use]
    pub fn color_format(mut self, format: ColorFormat) -> Self {
        self.config.display.color_format = format;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<Config, RfbClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Everything the protocol engine needs to open one session.
///
/// Validated by the engine, not by the connection manager.
#[derive(Clone, PartialEq)]
pub struct ConnectionParameters {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password, if known up front.
    pub password: Option<String>,
    /// Shared-session flag for ClientInit.
    pub shared: bool,
    /// Transport connect timeout.
    pub timeout: Duration,
    /// Preferred encodings, highest priority first.
    pub encodings: Vec<i32>,
    /// Pixel layout requested from the server.
    pub pixel_format: PixelFormat,
}

impl ConnectionParameters {
    /// Parameters for `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let mut params = Config::default().parameters();
        params.host = host.into();
        params.port = port;
        params
    }

    /// Parse `host`, `host:port` or `host:display`.
    ///
    /// A numeric suffix below 100 is a display number (port 5900 + display);
    /// anything else is a port.
    pub fn parse_server(server: &str) -> Result<Self, RfbClientError> {
        let (host, port) = match server.rsplit_once(':') {
            Some((host, suffix)) => {
                let n: u16 = suffix.parse().map_err(|_| {
                    RfbClientError::Config(format!("invalid port or display in '{server}'"))
                })?;
                let port = if n < 100 {
                    DEFAULT_PORT + n
                } else {
                    n
                };
                (host, port)
            }
            None => (server, DEFAULT_PORT),
        };
        let params = Self::new(host, port);
        params.validate()?;
        Ok(params)
    }

    /// `host:port` label for logs.
    #[must_use]
    pub fn server_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), RfbClientError> {
        if self.host.is_empty() {
            return Err(RfbClientError::Config("Host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(RfbClientError::Config("Port cannot be 0".to_string()));
        }
        self.validate_session()
    }

    /// Check the settings that do not name the server.
    ///
    /// The address itself is checked when the transport opens.
    pub fn validate_session(&self) -> Result<(), RfbClientError> {
        if self.timeout.is_zero() {
            return Err(RfbClientError::Config("Timeout cannot be 0".to_string()));
        }
        if self.encodings.is_empty() {
            return Err(RfbClientError::Config(
                "At least one encoding must be specified".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("shared", &self.shared)
            .field("timeout", &self.timeout)
            .field("encodings", &self.encodings)
            .field("pixel_format", &self.pixel_format.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .host("localhost")
            .port(5901)
            .shared(false)
            .build()
            .unwrap();

        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 5901);
        assert!(!config.connection.shared);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_err());
        assert!(Config::builder().host("localhost").port(0).build().is_err());
        assert!(Config::builder()
            .host("localhost")
            .timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(Config::builder()
            .host("localhost")
            .encodings(Vec::<Encoding>::new())
            .build()
            .is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [connection]
            host = "vnc.example.com"
            port = 5902
            password = "secret"

            [display]
            color_format = "rgb565"
            encodings = [0, 1]
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.host, "vnc.example.com");
        assert_eq!(config.connection.port, 5902);
        assert_eq!(config.connection.password.as_deref(), Some("secret"));
        assert!(config.connection.shared);
        assert_eq!(config.connection.timeout_ms, 10_000);
        assert_eq!(config.display.color_format, ColorFormat::Rgb565);
        assert_eq!(config.display.encodings, vec![0, 1]);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(matches!(
            Config::from_toml_str("[connection]\nport = 5900\n"),
            Err(RfbClientError::Config(_))
        ));
        assert!(matches!(
            Config::from_toml_str("not toml ["),
            Err(RfbClientError::Config(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::builder().host("h").port(5905).build().unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_parse_server() {
        let p = ConnectionParameters::parse_server("localhost").unwrap();
        assert_eq!((p.host.as_str(), p.port), ("localhost", 5900));

        let p = ConnectionParameters::parse_server("10.0.0.5:1").unwrap();
        assert_eq!((p.host.as_str(), p.port), ("10.0.0.5", 5901));

        let p = ConnectionParameters::parse_server("vnc.example.com:5999").unwrap();
        assert_eq!((p.host.as_str(), p.port), ("vnc.example.com", 5999));

        assert!(ConnectionParameters::parse_server("host:abc").is_err());
        assert!(ConnectionParameters::parse_server(":1").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut p = ConnectionParameters::new("h", 5900);
        p.password = Some("hunter2".into());
        let text = format!("{p:?}");
        assert!(!text.contains("hunter2"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn test_default_encodings() {
        let encodings = default_encodings();
        assert!(encodings.contains(&Encoding::Tight.id()));
        assert_eq!(*encodings.last().unwrap(), Encoding::Raw.id());
    }
}
