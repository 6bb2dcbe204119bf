// SQLite Driver
// Implements DatabaseDriver for SQLite using rusqlite

use std::sync::Arc;

use rusqlite::types::ValueRef;
use rusqlite::{Connection as RusqliteConnection, OpenFlags};

use crate::config::ServerConfig;
use crate::db::traits::{
    CellValue, ColumnInfo, ColumnMeta, Connection, ConnectionError, DatabaseDriver, Dialect,
    QueryError, QueryResult, ReflectionError, TableMeta,
};

/// SQLite specific connection wrapper
pub struct SqliteConnection {
    pub id: String,
    pub conn: Arc<tokio::sync::Mutex<RusqliteConnection>>,
}

#[async_trait::async_trait]
impl Connection for SqliteConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        self.conn
            .lock()
            .await
            .query_row("SELECT 1", [], |_| Ok(()))
            .is_ok()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// SQLite driver implementation
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }

    /// Database path from the resolved endpoint, falling back to the
    /// descriptor's database field.
    fn database_path(endpoint: &str, server: &ServerConfig) -> String {
        endpoint
            .strip_prefix("sqlite:///")
            .map(str::to_string)
            .unwrap_or_else(|| server.database.clone())
    }

    fn downcast<'a>(conn: &'a dyn Connection) -> Option<&'a SqliteConnection> {
        conn.as_any().downcast_ref::<SqliteConnection>()
    }

    /// Schema/table names land in identifier position; double quotes are the
    /// only character that can break out of the quoting.
    fn quote_ident(name: &str) -> Result<String, ReflectionError> {
        if name.contains('"') {
            return Err(ReflectionError::Introspection(format!(
                "invalid identifier: {}",
                name
            )));
        }
        Ok(format!("\"{}\"", name))
    }

    fn cell_value(row: &rusqlite::Row, idx: usize) -> CellValue {
        match row.get_ref(idx) {
            Ok(ValueRef::Null) => CellValue::Null,
            Ok(ValueRef::Integer(i)) => CellValue::Int(i),
            Ok(ValueRef::Real(f)) => CellValue::Float(f),
            Ok(ValueRef::Text(t)) => CellValue::String(String::from_utf8_lossy(t).to_string()),
            Ok(ValueRef::Blob(b)) => CellValue::Binary(b.to_vec()),
            Err(_) => CellValue::Null,
        }
    }

    /// Column names of the unique single-column indexes on a table
    fn unique_columns(
        db: &RusqliteConnection,
        prefix: &str,
        table: &str,
    ) -> Result<Vec<String>, rusqlite::Error> {
        let mut unique = Vec::new();

        let list_sql = format!("PRAGMA {}index_list({})", prefix, table);
        let mut stmt = db.prepare(&list_sql)?;
        let indexes: Vec<(String, bool, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<_, _>>()?;

        for (index_name, is_unique, origin) in indexes {
            // Primary-key indexes are reported separately via table_info
            if !is_unique || origin == "pk" {
                continue;
            }
            let info_sql = format!("PRAGMA {}index_info(\"{}\")", prefix, index_name.replace('"', "\"\""));
            let mut stmt = db.prepare(&info_sql)?;
            let columns: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .collect::<Result<_, _>>()?;
            if columns.len() == 1 {
                unique.push(columns.into_iter().next().unwrap());
            }
        }

        Ok(unique)
    }

    fn reflect_blocking(
        db: &RusqliteConnection,
        schema: Option<&str>,
    ) -> Result<Vec<TableMeta>, ReflectionError> {
        // A named schema targets an attached database; unnamed reflection
        // covers the main database and reports no schema
        let prefix = match schema {
            Some(name) => format!("{}.", Self::quote_ident(name)?),
            None => String::new(),
        };

        let to_reflection_err = |e: rusqlite::Error| ReflectionError::Introspection(e.to_string());

        let tables_sql = format!(
            "SELECT name FROM {}sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            prefix
        );
        let mut stmt = db.prepare(&tables_sql).map_err(to_reflection_err)?;
        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(to_reflection_err)?
            .collect::<Result<_, _>>()
            .map_err(to_reflection_err)?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            let quoted = Self::quote_ident(&table_name)?;
            let unique =
                Self::unique_columns(db, &prefix, &quoted).map_err(to_reflection_err)?;

            let info_sql = format!("PRAGMA {}table_info({})", prefix, quoted);
            let mut stmt = db.prepare(&info_sql).map_err(to_reflection_err)?;
            let columns: Vec<ColumnMeta> = stmt
                .query_map([], |row| {
                    let cid: i32 = row.get(0)?;
                    let name: String = row.get(1)?;
                    let data_type: String = row.get(2)?;
                    let not_null: i64 = row.get(3)?;
                    let pk: i64 = row.get(5)?;
                    Ok(ColumnMeta {
                        unique: unique.contains(&name),
                        name,
                        data_type,
                        nullable: not_null == 0 && pk == 0,
                        primary_key: pk > 0,
                        ordinal: cid,
                    })
                })
                .map_err(to_reflection_err)?
                .collect::<Result<_, _>>()
                .map_err(to_reflection_err)?;

            tables.push(TableMeta {
                schema: schema.map(str::to_string),
                name: table_name,
                columns,
            });
        }

        Ok(tables)
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DatabaseDriver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(
        &self,
        endpoint: &str,
        server: &ServerConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let path = Self::database_path(endpoint, server);
        let conn = RusqliteConnection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| ConnectionError::Failed(format!("failed to open {}: {}", path, e)))?;

        Ok(Box::new(SqliteConnection {
            id: uuid::Uuid::new_v4().to_string(),
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
        }))
    }

    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
    ) -> Result<QueryResult, QueryError> {
        let sqlite = Self::downcast(conn).ok_or(QueryError::InvalidConnection)?;
        let guard = sqlite.conn.lock().await;
        let db = &*guard;
        let start = std::time::Instant::now();

        let mut result = QueryResult::new();
        let is_select = {
            let upper = sql.trim_start().to_uppercase();
            upper.starts_with("SELECT") || upper.starts_with("WITH") || upper.starts_with("PRAGMA")
        };

        if is_select {
            let mut stmt = db
                .prepare(sql)
                .map_err(|e| QueryError::Execution(e.to_string()))?;

            // SQLite is dynamically typed; result columns have no stable
            // declared type
            result.columns = stmt
                .column_names()
                .iter()
                .map(|name| ColumnInfo {
                    name: name.to_string(),
                    data_type: "any".to_string(),
                    nullable: true,
                })
                .collect();
            let column_count = result.columns.len();

            let mut rows = stmt
                .query([])
                .map_err(|e| QueryError::Execution(e.to_string()))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| QueryError::Execution(e.to_string()))?
            {
                result
                    .rows
                    .push((0..column_count).map(|idx| Self::cell_value(row, idx)).collect());
            }
        } else {
            let affected = db
                .execute(sql, [])
                .map_err(|e| QueryError::Execution(e.to_string()))?;
            result.columns = vec![ColumnInfo {
                name: "rows_affected".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
            }];
            result.rows = vec![vec![CellValue::Int(affected as i64)]];
        }

        result.row_count = result.rows.len();
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn reflect(
        &self,
        conn: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<TableMeta>, ReflectionError> {
        let sqlite = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;
        let guard = sqlite.conn.lock().await;
        Self::reflect_blocking(&guard, schema)
    }

    async fn list_schemas(&self, conn: &dyn Connection) -> Result<Vec<String>, ReflectionError> {
        let sqlite = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;
        let guard = sqlite.conn.lock().await;

        let mut stmt = guard
            .prepare("PRAGMA database_list")
            .map_err(|e| ReflectionError::Introspection(e.to_string()))?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .map_err(|e| ReflectionError::Introspection(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| ReflectionError::Introspection(e.to_string()))?;

        Ok(names)
    }
}
