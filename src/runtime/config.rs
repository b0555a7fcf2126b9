//! Server configuration.

use crate::logger::LogFormat;
use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for a [`Server`](crate::runtime::Server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
    /// Value of the `Powered-By` response header.
    pub server_header: String,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Whether HTTP/1.1 keep-alive is enabled.
    pub keep_alive: bool,
    /// Output format used by [`init_tracing`](crate::logger::init_tracing).
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            server_header: "Fireball".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            keep_alive: true,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from `FIREBALL_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("FIREBALL_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("FIREBALL_PORT").and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        if let Some(header) = lookup("FIREBALL_SERVER_HEADER") {
            config.server_header = header;
        }
        if let Some(size) = lookup("FIREBALL_MAX_BODY_SIZE").and_then(|v| v.parse().ok()) {
            config.max_body_size = size;
        }
        if let Some(keep_alive) = lookup("FIREBALL_KEEP_ALIVE").and_then(|v| parse_bool(&v)) {
            config.keep_alive = keep_alive;
        }
        if let Some(format) = lookup("FIREBALL_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.log_format = format;
        }

        config
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the `Powered-By` header value.
    pub fn server_header(mut self, value: impl Into<String>) -> Self {
        self.server_header = value.into();
        self
    }

    /// Set the maximum request body size.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Enable or disable keep-alive.
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Set the log output format.
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert_eq!(config.server_header, "Fireball");
        assert!(config.keep_alive);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new().host("0.0.0.0").port(8080).keep_alive(false);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert!(!config.keep_alive);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("FIREBALL_PORT", "4100"),
            ("FIREBALL_KEEP_ALIVE", "off"),
            ("FIREBALL_LOG_FORMAT", "json"),
            ("FIREBALL_MAX_BODY_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ServerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.port, 4100);
        assert!(!config.keep_alive);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_body_size, ServerConfig::default().max_body_size);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_partial_deserialize() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
    }
}
