// Database Driver Traits
// Core abstraction shared by the native drivers and the bridge gateway

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, ServerConfig};

/// Supported dialects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mssql,
    Iris,
}

impl Dialect {
    /// Display name for diagnostics
    pub fn display_name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "SQLite",
            Dialect::Postgres => "PostgreSQL",
            Dialect::Mssql => "Microsoft SQL Server",
            Dialect::Iris => "InterSystems IRIS",
        }
    }

    /// Lowercase identifier used in endpoints and config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::Mssql => "mssql",
            Dialect::Iris => "iris",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" => Ok(Dialect::Postgres),
            "mssql" => Ok(Dialect::Mssql),
            "iris" => Ok(Dialect::Iris),
            other => Err(ConfigError::UnknownDialect(other.to_string())),
        }
    }

    /// File-backed engines address a local file, not a network host.
    pub fn is_file_backed(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// Default port for the dialect
    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::Sqlite => 0, // File-based, no port
            Dialect::Postgres => 5432,
            Dialect::Mssql => 1433,
            Dialect::Iris => 1972,
        }
    }
}

/// How a connection is opened: through a native driver, or through the
/// wire-protocol bridge for databases with no native equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    Native,
    Bridge,
}

impl ConnectKind {
    /// Parse a `conn_type` string. Anything unrecognized is rejected here,
    /// before any network attempt.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "native" => Ok(ConnectKind::Native),
            "bridge" => Ok(ConnectKind::Bridge),
            other => Err(ConfigError::UnsupportedConnectionType(other.to_string())),
        }
    }
}

/// Failure while opening a connection. Propagates to the caller; not retried.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Failed(String),

    #[error("driver not registered for dialect: {0:?}")]
    DriverNotFound(Dialect),

    #[error("invalid connection handle")]
    InvalidConnection,

    #[error("bridge gateway error: {0}")]
    Bridge(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure introspecting a schema. The reflector isolates these per schema.
#[derive(Error, Debug)]
pub enum ReflectionError {
    #[error("reflection failed: {0}")]
    Introspection(String),

    #[error("invalid connection handle")]
    InvalidConnection,
}

/// Failure executing SQL. The lossy executor path collapses these to
/// no-result after logging.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("no SQL statement provided")]
    MissingSql,

    #[error("query execution failed: {0}")]
    Execution(String),

    #[error("invalid connection handle")]
    InvalidConnection,
}

/// Cell value in a result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(String),
    Binary(Vec<u8>),
}

/// Column header of a query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Tabular query result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Raw column metadata as reported by a driver, before catalog mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Dialect-native type rendering, e.g. "character varying" or "INTEGER"
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub ordinal: i32,
}

/// Raw table metadata as reported by a driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    /// Schema the source reports for the table; None when the source has no
    /// schema concept or did not report one
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnMeta>,
}

impl TableMeta {
    /// Schema-qualified name when a schema was reported, bare name otherwise
    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Connection trait - all live connection handles implement this
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection ID
    fn connection_id(&self) -> &str;

    /// Test if the connection is alive
    async fn is_alive(&self) -> bool;

    /// Allow downcasting for driver-specific operations
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Database driver trait - all database drivers implement this
#[async_trait::async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// The dialect this driver supports
    fn dialect(&self) -> Dialect;

    /// Display name for this driver
    fn driver_name(&self) -> &'static str {
        self.dialect().display_name()
    }

    /// Open a connection from the resolved endpoint and its descriptor
    async fn connect(
        &self,
        endpoint: &str,
        server: &ServerConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError>;

    /// Execute a SQL statement and return a tabular result
    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
    ) -> Result<QueryResult, QueryError>;

    /// Raw table/column metadata for one named schema, or for the entire
    /// visible database when `schema` is None
    async fn reflect(
        &self,
        conn: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<TableMeta>, ReflectionError>;

    /// List the schema names visible on this connection
    async fn list_schemas(&self, conn: &dyn Connection) -> Result<Vec<String>, ReflectionError>;
}
