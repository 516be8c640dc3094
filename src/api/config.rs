//! HTTP server configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::config::ConfigError;

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Configuration for the booking API server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Origins allowed by CORS; empty means any
    pub allowed_origins: Vec<String>,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enable_cors: true,
            allowed_origins: Vec::new(),
            enable_request_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for origin in &self.allowed_origins {
            let parsed = url::Url::parse(origin).map_err(|e| {
                ConfigError::invalid("server.allowed_origins", format!("{origin}: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    "server.allowed_origins",
                    format!("{origin}: must use http or https"),
                ));
            }
        }

        if !self.enable_cors && !self.allowed_origins.is_empty() {
            return Err(ConfigError::invalid(
                "server.allowed_origins",
                "origins are listed but CORS is disabled",
            ));
        }

        Ok(())
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    bind_address: Option<SocketAddr>,
    enable_cors: Option<bool>,
    allowed_origins: Vec<String>,
    enable_request_logging: Option<bool>,
}

impl ServerConfigBuilder {
    /// Set bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set bind address from string
    pub fn bind_address_str(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.bind_address = Some(
            addr.parse()
                .map_err(|_| ConfigError::invalid("bind_address", format!("Invalid address: {addr}")))?,
        );
        Ok(self)
    }

    /// Enable/disable CORS
    pub fn enable_cors(mut self, enable: bool) -> Self {
        self.enable_cors = Some(enable);
        self
    }

    /// Allow one more CORS origin
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Enable/disable request logging
    pub fn enable_request_logging(mut self, enable: bool) -> Self {
        self.enable_request_logging = Some(enable);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let config = ServerConfig {
            bind_address: self.bind_address.unwrap_or_else(default_bind_address),
            enable_cors: self.enable_cors.unwrap_or(true),
            allowed_origins: self.allowed_origins,
            enable_request_logging: self.enable_request_logging.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
