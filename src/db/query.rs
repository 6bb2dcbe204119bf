// Query Execution
// Ad hoc SQL with per-call error isolation and tabular or flattened output

use serde::{Deserialize, Serialize};

use crate::db::traits::{Connection, DatabaseDriver, QueryError, QueryResult};
use crate::export::{CsvExporter, ExportOptions};

/// Requested result shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Table,
    Csv,
}

/// An execute request. `sql` is optional because requests arrive from
/// callers that may not have produced a statement at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: Option<String>,
    #[serde(default)]
    pub output: OutputMode,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            output: OutputMode::Table,
        }
    }

    pub fn csv(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            output: OutputMode::Csv,
        }
    }
}

/// Successful execution output
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Table(QueryResult),
    Csv(String),
}

pub struct QueryExecutor;

impl QueryExecutor {
    /// Strip trailing statement terminators before dispatch. Defensive
    /// against multi-statement strings ending in `;`.
    fn normalize(sql: &str) -> &str {
        sql.trim()
            .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
    }

    /// Execute a request through the explicit result-or-error boundary.
    /// Count-style statements take this same path; the distinction is
    /// caller intent only.
    pub async fn execute(
        driver: &dyn DatabaseDriver,
        conn: &dyn Connection,
        request: &QueryRequest,
    ) -> Result<QueryOutput, QueryError> {
        let sql = request.sql.as_deref().ok_or(QueryError::MissingSql)?;
        let sql = Self::normalize(sql);
        if sql.is_empty() {
            return Err(QueryError::MissingSql);
        }

        let result = driver.execute_query(conn, sql).await?;

        match request.output {
            OutputMode::Table => Ok(QueryOutput::Table(result)),
            OutputMode::Csv => {
                let csv = CsvExporter::new(ExportOptions::default())
                    .export_to_string(&result.columns, &result.rows)
                    .map_err(|e| QueryError::Execution(e.to_string()))?;
                Ok(QueryOutput::Csv(csv))
            }
        }
    }

    /// Failure-isolating entry point: any failure is logged with the
    /// offending statement and collapsed to no-result. Callers treat None
    /// as "failed"; diagnostic detail lives only in the logs.
    pub async fn run(
        driver: &dyn DatabaseDriver,
        conn: &dyn Connection,
        request: &QueryRequest,
    ) -> Option<QueryOutput> {
        match Self::execute(driver, conn, request).await {
            Ok(output) => Some(output),
            Err(QueryError::MissingSql) => {
                log::error!("no SQL provided for execute request");
                None
            }
            Err(err) => {
                log::error!(
                    "error executing SQL - {} - {}",
                    request.sql.as_deref().unwrap_or(""),
                    err
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::drivers::SqliteDriver;
    use crate::db::traits::{CellValue, DatabaseDriver, Dialect};

    async fn memory_session() -> (SqliteDriver, Box<dyn Connection>) {
        let driver = SqliteDriver::new();
        let server = ServerConfig::new("mem", Dialect::Sqlite, ":memory:");
        let conn = driver.connect("sqlite:///:memory:", &server).await.unwrap();
        (driver, conn)
    }

    #[test]
    fn test_normalize_strips_trailing_terminators() {
        assert_eq!(QueryExecutor::normalize("SELECT 1;"), "SELECT 1");
        assert_eq!(QueryExecutor::normalize("SELECT 1; ; "), "SELECT 1");
        assert_eq!(QueryExecutor::normalize("  SELECT 1  "), "SELECT 1");
        assert_eq!(QueryExecutor::normalize("SELECT 1"), "SELECT 1");
    }

    #[tokio::test]
    async fn test_select_one_returns_single_cell() {
        let (driver, conn) = memory_session().await;
        let request = QueryRequest::new("SELECT 1");

        let output = QueryExecutor::execute(&driver, conn.as_ref(), &request)
            .await
            .unwrap();
        match output {
            QueryOutput::Table(result) => {
                assert_eq!(result.columns.len(), 1);
                assert_eq!(result.rows.len(), 1);
                assert_eq!(result.rows[0][0], CellValue::Int(1));
                assert_eq!(result.row_count, 1);
            }
            _ => panic!("expected tabular output"),
        }
    }

    #[tokio::test]
    async fn test_trailing_terminator_is_equivalent() {
        let (driver, conn) = memory_session().await;

        let bare = QueryExecutor::execute(&driver, conn.as_ref(), &QueryRequest::new("SELECT 1"))
            .await
            .unwrap();
        let terminated =
            QueryExecutor::execute(&driver, conn.as_ref(), &QueryRequest::new("SELECT 1;"))
                .await
                .unwrap();

        match (bare, terminated) {
            (QueryOutput::Table(a), QueryOutput::Table(b)) => {
                assert_eq!(a.rows, b.rows);
                assert_eq!(a.columns.len(), b.columns.len());
            }
            _ => panic!("expected tabular output"),
        }
    }

    #[tokio::test]
    async fn test_malformed_sql_yields_no_result() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (driver, conn) = memory_session().await;
        let request = QueryRequest::new("SELEKT bogus");

        assert!(QueryExecutor::run(&driver, conn.as_ref(), &request)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_sql_yields_no_result() {
        let (driver, conn) = memory_session().await;
        let request = QueryRequest::default();

        assert!(matches!(
            QueryExecutor::execute(&driver, conn.as_ref(), &request).await,
            Err(QueryError::MissingSql)
        ));
        assert!(QueryExecutor::run(&driver, conn.as_ref(), &request)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_csv_output_mode() {
        let (driver, conn) = memory_session().await;
        driver
            .execute_query(
                conn.as_ref(),
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)",
            )
            .await
            .unwrap();
        driver
            .execute_query(
                conn.as_ref(),
                "INSERT INTO people (id, name) VALUES (1, 'Alice'), (2, 'Bob')",
            )
            .await
            .unwrap();

        let request = QueryRequest::csv("SELECT id, name FROM people ORDER BY id");
        let output = QueryExecutor::run(&driver, conn.as_ref(), &request)
            .await
            .unwrap();

        match output {
            QueryOutput::Csv(csv) => {
                assert!(csv.starts_with("id,name\n"));
                assert!(csv.contains("1,Alice"));
                assert!(csv.contains("2,Bob"));
            }
            _ => panic!("expected CSV output"),
        }
    }

    #[tokio::test]
    async fn test_count_query_takes_the_general_path() {
        let (driver, conn) = memory_session().await;
        driver
            .execute_query(conn.as_ref(), "CREATE TABLE t (x INTEGER)")
            .await
            .unwrap();
        driver
            .execute_query(conn.as_ref(), "INSERT INTO t VALUES (1), (2), (3)")
            .await
            .unwrap();

        let request = QueryRequest::new("SELECT COUNT(*) FROM t;");
        let output = QueryExecutor::execute(&driver, conn.as_ref(), &request)
            .await
            .unwrap();
        match output {
            QueryOutput::Table(result) => {
                assert_eq!(result.rows[0][0], CellValue::Int(3));
            }
            _ => panic!("expected tabular output"),
        }
    }
}
