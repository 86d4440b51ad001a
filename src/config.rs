use std::{collections::HashSet, env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::mcp::connection::ConnectionOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub notification_methods: HashSet<String>,
    pub announce_session_id: bool,
    pub dispatch_timeout: Option<Duration>,
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("MCP_ANNOUNCE_SESSION_ID must be true or false")]
    InvalidAnnounceFlag,
    #[error("MCP_DISPATCH_TIMEOUT_MS must be a positive integer")]
    InvalidDispatchTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = value("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = value("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let notification_methods = value("MCP_NOTIFICATION_METHODS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|method| !method.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let announce_session_id = value("MCP_ANNOUNCE_SESSION_ID")
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ConfigError::InvalidAnnounceFlag),
            })
            .transpose()?
            .unwrap_or(true);
        let dispatch_timeout = value("MCP_DISPATCH_TIMEOUT_MS")
            .map(|value| match value.parse::<u64>() {
                Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
                _ => Err(ConfigError::InvalidDispatchTimeout),
            })
            .transpose()?;
        let catalog_path = value("MCP_CATALOG_PATH").map(PathBuf::from);

        let config = Self {
            bind_addr,
            bind_port,
            notification_methods,
            announce_session_id,
            dispatch_timeout,
            catalog_path,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            notification_methods: self.notification_methods.clone(),
            announce_session_id: self.announce_session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = parse(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, 8080);
        assert!(config.notification_methods.is_empty());
        assert!(config.announce_session_id);
        assert_eq!(config.dispatch_timeout, None);
        assert_eq!(config.catalog_path, None);
    }

    #[test]
    fn invalid_port_fails() {
        let err = parse(&[("BIND_PORT", "99999")]).expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = parse(&[("BIND_ADDR", "not an address")]).expect_err("expected bad socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }

    #[test]
    fn notification_methods_are_split_and_trimmed() {
        let config = parse(&[("MCP_NOTIFICATION_METHODS", " listTools, ,getResource ")])
            .expect("config should parse");

        let options = config.connection_options();
        assert_eq!(options.notification_methods.len(), 2);
        assert!(options.notification_methods.contains("listTools"));
        assert!(options.notification_methods.contains("getResource"));
    }

    #[test]
    fn announce_flag_parses() {
        let config = parse(&[("MCP_ANNOUNCE_SESSION_ID", "False")]).expect("config should parse");
        assert!(!config.connection_options().announce_session_id);

        let err = parse(&[("MCP_ANNOUNCE_SESSION_ID", "maybe")]).expect_err("expected bad flag");
        assert!(matches!(err, ConfigError::InvalidAnnounceFlag));
    }

    #[test]
    fn dispatch_timeout_must_be_positive() {
        let config = parse(&[("MCP_DISPATCH_TIMEOUT_MS", "250")]).expect("config should parse");
        assert_eq!(config.dispatch_timeout, Some(Duration::from_millis(250)));

        let err = parse(&[("MCP_DISPATCH_TIMEOUT_MS", "0")]).expect_err("expected bad timeout");
        assert!(matches!(err, ConfigError::InvalidDispatchTimeout));
    }
}
