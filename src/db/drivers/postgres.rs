// PostgreSQL Driver
// Implements DatabaseDriver for PostgreSQL using tokio-postgres

use std::collections::HashMap;

use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls, Row};

use crate::config::ServerConfig;
use crate::db::traits::{
    CellValue, ColumnInfo, ColumnMeta, Connection, ConnectionError, DatabaseDriver, Dialect,
    QueryError, QueryResult, ReflectionError, TableMeta,
};

/// PostgreSQL specific connection wrapper. The background task drives the
/// socket and ends when the client drops.
pub struct PostgresConnection {
    pub id: String,
    pub client: Client,
    _io_task: tokio::task::JoinHandle<()>,
}

#[async_trait::async_trait]
impl Connection for PostgresConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        self.client.simple_query("SELECT 1").await.is_ok()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// PostgreSQL driver implementation
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }

    fn downcast<'a>(conn: &'a dyn Connection) -> Option<&'a PostgresConnection> {
        conn.as_any().downcast_ref::<PostgresConnection>()
    }

    fn cell_value(row: &Row, idx: usize) -> CellValue {
        let column_type = row.columns()[idx].type_();
        match *column_type {
            Type::BOOL => match row.try_get::<_, Option<bool>>(idx) {
                Ok(Some(v)) => CellValue::Bool(v),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::INT2 => match row.try_get::<_, Option<i16>>(idx) {
                Ok(Some(v)) => CellValue::Int(v as i64),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::INT4 => match row.try_get::<_, Option<i32>>(idx) {
                Ok(Some(v)) => CellValue::Int(v as i64),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::INT8 => match row.try_get::<_, Option<i64>>(idx) {
                Ok(Some(v)) => CellValue::Int(v),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::FLOAT4 => match row.try_get::<_, Option<f32>>(idx) {
                Ok(Some(v)) => CellValue::Float(v as f64),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::FLOAT8 => match row.try_get::<_, Option<f64>>(idx) {
                Ok(Some(v)) => CellValue::Float(v),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::TIMESTAMP => match row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::TIMESTAMPTZ => {
                match row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx) {
                    Ok(Some(v)) => CellValue::DateTime(v.to_rfc3339()),
                    Ok(None) => CellValue::Null,
                    Err(_) => CellValue::Null,
                }
            }
            Type::DATE => match row.try_get::<_, Option<chrono::NaiveDate>>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::TIME => match row.try_get::<_, Option<chrono::NaiveTime>>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            Type::BYTEA => match row.try_get::<_, Option<Vec<u8>>>(idx) {
                Ok(Some(v)) => CellValue::Binary(v),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
            _ => match row.try_get::<_, Option<String>>(idx) {
                Ok(Some(v)) => CellValue::String(v),
                Ok(None) => CellValue::Null,
                Err(_) => CellValue::Null,
            },
        }
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

// information_schema columns are domain types; cast to text/int so the
// client can decode them
const REFLECT_COLUMNS_SQL: &str = "\
    SELECT c.table_schema::text,
           c.table_name::text,
           c.column_name::text,
           c.data_type::text,
           c.is_nullable = 'YES',
           c.ordinal_position::int,
           EXISTS (
               SELECT 1
               FROM information_schema.table_constraints tc
               JOIN information_schema.key_column_usage kcu
                 ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
               WHERE tc.constraint_type = 'PRIMARY KEY'
                 AND tc.table_schema = c.table_schema
                 AND tc.table_name = c.table_name
                 AND kcu.column_name = c.column_name
           ) AS is_primary,
           EXISTS (
               SELECT 1
               FROM information_schema.table_constraints tc
               JOIN information_schema.key_column_usage kcu
                 ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
               WHERE tc.constraint_type = 'UNIQUE'
                 AND tc.table_schema = c.table_schema
                 AND tc.table_name = c.table_name
                 AND kcu.column_name = c.column_name
           ) AS is_unique
    FROM information_schema.columns c
    JOIN information_schema.tables t
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE t.table_type = 'BASE TABLE'";

#[async_trait::async_trait]
impl DatabaseDriver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(
        &self,
        endpoint: &str,
        _server: &ServerConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        // tokio-postgres accepts the resolved URL form directly
        let (client, connection) = tokio_postgres::connect(endpoint, NoTls)
            .await
            .map_err(|e| ConnectionError::Failed(e.to_string()))?;

        let io_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("postgres connection task ended: {}", e);
            }
        });

        Ok(Box::new(PostgresConnection {
            id: uuid::Uuid::new_v4().to_string(),
            client,
            _io_task: io_task,
        }))
    }

    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
    ) -> Result<QueryResult, QueryError> {
        let pg = Self::downcast(conn).ok_or(QueryError::InvalidConnection)?;
        let start = std::time::Instant::now();

        let stmt = pg
            .client
            .prepare(sql)
            .await
            .map_err(|e| QueryError::Execution(e.to_string()))?;

        let mut result = QueryResult::new();
        result.columns = stmt
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                nullable: true,
            })
            .collect();

        let rows = pg
            .client
            .query(&stmt, &[])
            .await
            .map_err(|e| QueryError::Execution(e.to_string()))?;

        for row in &rows {
            result.rows.push(
                (0..row.columns().len())
                    .map(|idx| Self::cell_value(row, idx))
                    .collect(),
            );
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
        let pg = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;

        let rows = match schema {
            Some(name) => {
                let sql = format!(
                    "{} AND c.table_schema = $1 \
                     ORDER BY c.table_schema, c.table_name, c.ordinal_position",
                    REFLECT_COLUMNS_SQL
                );
                pg.client
                    .query(sql.as_str(), &[&name])
                    .await
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
            }
            None => {
                let sql = format!(
                    "{} AND c.table_schema NOT IN ('pg_catalog', 'information_schema') \
                     ORDER BY c.table_schema, c.table_name, c.ordinal_position",
                    REFLECT_COLUMNS_SQL
                );
                pg.client
                    .query(sql.as_str(), &[])
                    .await
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
            }
        };

        // Rows arrive ordered; group into tables preserving that order
        let mut order: Vec<(String, String)> = Vec::new();
        let mut grouped: HashMap<(String, String), Vec<ColumnMeta>> = HashMap::new();

        for row in &rows {
            let table_schema: String = row.get(0);
            let table_name: String = row.get(1);
            let key = (table_schema, table_name);
            if !grouped.contains_key(&key) {
                order.push(key.clone());
            }
            grouped.entry(key).or_default().push(ColumnMeta {
                name: row.get(2),
                data_type: row.get(3),
                nullable: row.get(4),
                ordinal: row.get::<_, i32>(5),
                primary_key: row.get(6),
                unique: row.get(7),
            });
        }

        Ok(order
            .into_iter()
            .map(|key| {
                let columns = grouped.remove(&key).unwrap_or_default();
                TableMeta {
                    schema: Some(key.0),
                    name: key.1,
                    columns,
                }
            })
            .collect())
    }

    async fn list_schemas(&self, conn: &dyn Connection) -> Result<Vec<String>, ReflectionError> {
        let pg = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;

        let rows = pg
            .client
            .query(
                "SELECT schema_name::text FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY schema_name",
                &[],
            )
            .await
            .map_err(|e| ReflectionError::Introspection(e.to_string()))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}
