// Bridge Gateway Client
// Wire-protocol bridge for legacy databases with no native driver. The
// gateway runs as a subprocess and speaks newline-delimited JSON over
// stdin/stdout; this side hands it the JDBC-style protocol URL, driver class
// name, credential pair, and supporting library paths from the descriptor.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::config::{ConfigError, ServerConfig};
use crate::db::traits::{
    Connection, ConnectionError, DatabaseDriver, Dialect, QueryError, QueryResult,
    ReflectionError, TableMeta,
};

/// Protocol prefix of every bridge URL
pub const BRIDGE_PROTOCOL: &str = "jdbc";

/// Default gateway program, resolved from PATH
const DEFAULT_GATEWAY_PROGRAM: &str = "dbatlas-gateway";

/// Bridge scheme token for a dialect, as the gateway driver expects it
pub fn bridge_scheme(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Iris => "IRIS",
        other => other.as_str(),
    }
}

/// Build the protocol URL handed to the gateway:
/// `jdbc:IRIS://<host>:<port>/<database>`.
pub fn bridge_url(server: &ServerConfig) -> Result<String, ConfigError> {
    let host = server.host.as_deref().ok_or_else(|| ConfigError::MissingField {
        server: server.name.clone(),
        field: "host",
    })?;
    Ok(format!(
        "{}:{}://{}:{}/{}",
        BRIDGE_PROTOCOL,
        bridge_scheme(server.dialect),
        host,
        server.port_or_default(),
        server.database
    ))
}

/// Requests sent to the gateway, one JSON object per line
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    Open {
        url: String,
        driver: Option<String>,
        credentials: [String; 2],
        libraries: Vec<String>,
    },
    Execute {
        sql: String,
    },
    Reflect {
        schema: Option<String>,
    },
    ListSchemas,
    Ping,
    Close,
}

/// Responses from the gateway, one JSON object per line
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BridgeResponse {
    Ok {
        #[serde(default)]
        data: serde_json::Value,
    },
    Error {
        message: String,
    },
}

/// Live handle to a gateway subprocess
pub struct BridgeConnection {
    id: String,
    stdin: Mutex<BufWriter<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    _child: Child,
}

impl BridgeConnection {
    /// Send one request and read one response line. Calls are serialized;
    /// the gateway answers in order.
    async fn roundtrip(&self, request: &BridgeRequest) -> Result<serde_json::Value, String> {
        let mut line = serde_json::to_string(request).map_err(|e| e.to_string())?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| e.to_string())?;
            stdin.flush().await.map_err(|e| e.to_string())?;
        }

        let mut response = String::new();
        {
            let mut stdout = self.stdout.lock().await;
            let read = stdout
                .read_line(&mut response)
                .await
                .map_err(|e| e.to_string())?;
            if read == 0 {
                return Err("gateway closed its stdout".to_string());
            }
        }

        match serde_json::from_str(&response).map_err(|e| e.to_string())? {
            BridgeResponse::Ok { data } => Ok(data),
            BridgeResponse::Error { message } => Err(message),
        }
    }
}

#[async_trait::async_trait]
impl Connection for BridgeConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        self.roundtrip(&BridgeRequest::Ping).await.is_ok()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Driver that routes every operation through the bridge gateway
pub struct BridgeDriver {
    dialect: Dialect,
    program: PathBuf,
}

impl BridgeDriver {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_program(dialect, DEFAULT_GATEWAY_PROGRAM)
    }

    /// Use a specific gateway program instead of resolving from PATH
    pub fn with_program(dialect: Dialect, program: impl Into<PathBuf>) -> Self {
        Self {
            dialect,
            program: program.into(),
        }
    }

    fn downcast<'a>(conn: &'a dyn Connection) -> Option<&'a BridgeConnection> {
        conn.as_any().downcast_ref::<BridgeConnection>()
    }
}

#[async_trait::async_trait]
impl DatabaseDriver for BridgeDriver {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(
        &self,
        _endpoint: &str,
        server: &ServerConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let url = bridge_url(server)?;

        let mut child = Command::new(&self.program)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConnectionError::Bridge("gateway stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectionError::Bridge("gateway stdout unavailable".to_string()))?;

        let connection = BridgeConnection {
            id: uuid::Uuid::new_v4().to_string(),
            stdin: Mutex::new(BufWriter::new(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            _child: child,
        };

        log::debug!("opening bridge connection to {}", url);
        let open = BridgeRequest::Open {
            url,
            driver: server.driver.clone(),
            credentials: [
                server.user.clone().unwrap_or_default(),
                server.password.clone().unwrap_or_default(),
            ],
            libraries: server.libraries.clone(),
        };
        connection
            .roundtrip(&open)
            .await
            .map_err(ConnectionError::Bridge)?;

        Ok(Box::new(connection))
    }

    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
    ) -> Result<QueryResult, QueryError> {
        let bridge = Self::downcast(conn).ok_or(QueryError::InvalidConnection)?;

        let start = std::time::Instant::now();
        let data = bridge
            .roundtrip(&BridgeRequest::Execute { sql: sql.to_string() })
            .await
            .map_err(QueryError::Execution)?;

        let mut result: QueryResult =
            serde_json::from_value(data).map_err(|e| QueryError::Execution(e.to_string()))?;
        result.row_count = result.rows.len();
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn reflect(
        &self,
        conn: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<TableMeta>, ReflectionError> {
        let bridge = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;

        let data = bridge
            .roundtrip(&BridgeRequest::Reflect {
                schema: schema.map(str::to_string),
            })
            .await
            .map_err(ReflectionError::Introspection)?;

        serde_json::from_value(data).map_err(|e| ReflectionError::Introspection(e.to_string()))
    }

    async fn list_schemas(&self, conn: &dyn Connection) -> Result<Vec<String>, ReflectionError> {
        let bridge = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;

        let data = bridge
            .roundtrip(&BridgeRequest::ListSchemas)
            .await
            .map_err(ReflectionError::Introspection)?;

        serde_json::from_value(data).map_err(|e| ReflectionError::Introspection(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iris_server() -> ServerConfig {
        let mut server = ServerConfig::new("legacy", Dialect::Iris, "APP");
        server.host = Some("iris.internal".to_string());
        server.port = Some(1972);
        server.user = Some("admin".to_string());
        server.password = Some("pw".to_string());
        server.driver = Some("com.intersystems.jdbc.IRISDriver".to_string());
        server.libraries = vec!["/opt/iris/intersystems-jdbc.jar".to_string()];
        server
    }

    #[test]
    fn test_bridge_url_shape() {
        let url = bridge_url(&iris_server()).unwrap();
        assert_eq!(url, "jdbc:IRIS://iris.internal:1972/APP");
    }

    #[test]
    fn test_bridge_url_uses_dialect_default_port() {
        let mut server = iris_server();
        server.port = None;
        assert_eq!(bridge_url(&server).unwrap(), "jdbc:IRIS://iris.internal:1972/APP");
    }

    #[test]
    fn test_bridge_url_requires_host() {
        let mut server = iris_server();
        server.host = None;
        assert!(matches!(
            bridge_url(&server),
            Err(ConfigError::MissingField { field: "host", .. })
        ));
    }

    #[test]
    fn test_request_wire_format() {
        let open = BridgeRequest::Open {
            url: "jdbc:IRIS://h:1972/APP".to_string(),
            driver: Some("com.intersystems.jdbc.IRISDriver".to_string()),
            credentials: ["admin".to_string(), "pw".to_string()],
            libraries: vec!["a.jar".to_string()],
        };
        let line = serde_json::to_string(&open).unwrap();
        assert!(line.contains(r#""op":"open""#));

        let parsed: BridgeRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, open);
    }

    #[test]
    fn test_response_wire_format() {
        let ok: BridgeResponse =
            serde_json::from_str(r#"{"status":"ok","data":{"columns":[],"rows":[]}}"#).unwrap();
        assert!(matches!(ok, BridgeResponse::Ok { .. }));

        let err: BridgeResponse =
            serde_json::from_str(r#"{"status":"error","message":"boom"}"#).unwrap();
        match err {
            BridgeResponse::Error { message } => assert_eq!(message, "boom"),
            _ => panic!("expected error response"),
        }
    }
}
