// Server Configuration
// Declarative description of connectable data sources and the active one

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::traits::Dialect;

/// Configuration errors. Always fatal to the requesting call.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("no active source server configured")]
    NoActiveSource,

    #[error("connection type not supported: {0}")]
    UnsupportedConnectionType(String),

    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("server {server} is missing required field: {field}")]
    MissingField { server: String, field: &'static str },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One connectable data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub dialect: Dialect,

    // Network fields; file-backed dialects may omit all of them
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)] // Don't serialize password
    pub password: Option<String>,

    pub database: String,

    /// Schemas to introspect. None or empty means a single "default" schema.
    #[serde(default)]
    pub schemas: Option<Vec<String>>,

    /// Bridge driver class name (bridge connections only)
    #[serde(default)]
    pub driver: Option<String>,

    /// Supporting library paths handed to the bridge gateway
    #[serde(default, alias = "jars")]
    pub libraries: Vec<String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, dialect: Dialect, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dialect,
            host: None,
            port: None,
            user: None,
            password: None,
            database: database.into(),
            schemas: None,
            driver: None,
            libraries: Vec::new(),
        }
    }

    /// Port to dial, falling back to the dialect default.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }
}

/// Ordered server list plus the designated active source.
///
/// Lookup is a linear scan by name, case-sensitive, first match. List sizes
/// are expected to be in the tens of entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub src_server: Option<String>,
}

impl Configuration {
    /// Load a configuration from a JSON file. Unknown fields are ignored;
    /// missing required fields fail fast.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Find a server by name.
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// The designated active source server.
    pub fn active_server(&self) -> Result<&ServerConfig, ConfigError> {
        let name = self.src_server.as_deref().ok_or(ConfigError::NoActiveSource)?;
        self.server(name)
            .ok_or_else(|| ConfigError::ServerNotFound(name.to_string()))
    }

    /// Resolve a named server, falling back to the active source when no
    /// name is given.
    pub fn resolve(&self, name: Option<&str>) -> Result<&ServerConfig, ConfigError> {
        match name {
            Some(n) => self
                .server(n)
                .ok_or_else(|| ConfigError::ServerNotFound(n.to_string())),
            None => self.active_server(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "servers": [
            {
                "name": "warehouse",
                "dialect": "postgres",
                "host": "db.internal",
                "port": 5432,
                "user": "etl",
                "password": "secret",
                "database": "warehouse",
                "schemas": ["public", "staging"]
            },
            {
                "name": "legacy",
                "dialect": "iris",
                "host": "iris.internal",
                "port": 1972,
                "user": "admin",
                "password": "pw",
                "database": "APP",
                "driver": "com.intersystems.jdbc.IRISDriver",
                "jars": ["/opt/iris/intersystems-jdbc.jar"],
                "comment": "unknown fields are ignored"
            },
            {
                "name": "local",
                "dialect": "sqlite",
                "database": "app.db"
            }
        ],
        "src_server": "warehouse"
    }"#;

    #[test]
    fn test_parse_sample() {
        let config = Configuration::from_json(SAMPLE).unwrap();
        assert_eq!(config.servers.len(), 3);
        assert_eq!(config.src_server.as_deref(), Some("warehouse"));

        let legacy = config.server("legacy").unwrap();
        assert_eq!(legacy.dialect, Dialect::Iris);
        assert_eq!(legacy.driver.as_deref(), Some("com.intersystems.jdbc.IRISDriver"));
        assert_eq!(legacy.libraries, vec!["/opt/iris/intersystems-jdbc.jar"]);

        let local = config.server("local").unwrap();
        assert!(local.host.is_none());
        assert!(local.schemas.is_none());
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let config = Configuration::from_json(SAMPLE).unwrap();
        assert!(config.server("warehouse").is_some());
        assert!(config.server("Warehouse").is_none());
    }

    #[test]
    fn test_active_server() {
        let config = Configuration::from_json(SAMPLE).unwrap();
        assert_eq!(config.active_server().unwrap().name, "warehouse");
        assert_eq!(config.resolve(None).unwrap().name, "warehouse");
        assert_eq!(config.resolve(Some("local")).unwrap().name, "local");
    }

    #[test]
    fn test_missing_server_is_an_error() {
        let config = Configuration::from_json(SAMPLE).unwrap();
        assert!(matches!(
            config.resolve(Some("nope")),
            Err(ConfigError::ServerNotFound(_))
        ));
    }

    #[test]
    fn test_no_active_source() {
        let config = Configuration::from_json(r#"{"servers": []}"#).unwrap();
        assert!(matches!(config.active_server(), Err(ConfigError::NoActiveSource)));
    }

    #[test]
    fn test_missing_required_field_fails_fast() {
        // "database" is required on every server entry
        let raw = r#"{"servers": [{"name": "x", "dialect": "sqlite"}]}"#;
        assert!(Configuration::from_json(raw).is_err());
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = Configuration::from_json(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
