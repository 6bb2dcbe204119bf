// MSSQL Driver
// Implements DatabaseDriver for Microsoft SQL Server using tiberius

use std::collections::HashMap;

use tiberius::numeric::Numeric;
use tiberius::xml::XmlData;
use tiberius::{AuthMethod, Client, ColumnType, Config, EncryptionLevel, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::ServerConfig;
use crate::db::traits::{
    CellValue, ColumnInfo, ColumnMeta, Connection, ConnectionError, DatabaseDriver, Dialect,
    QueryError, QueryResult, ReflectionError, TableMeta,
};

type MssqlClient = Client<Compat<TcpStream>>;

/// MSSQL specific connection wrapper. tiberius clients take &mut for
/// queries, so the client sits behind a Mutex.
pub struct MssqlConnection {
    pub id: String,
    pub client: tokio::sync::Mutex<MssqlClient>,
}

#[async_trait::async_trait]
impl Connection for MssqlConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        let mut client = self.client.lock().await;
        let alive = client.simple_query("SELECT 1").await.is_ok();
        alive
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// MSSQL driver implementation
pub struct MssqlDriver;

impl MssqlDriver {
    pub fn new() -> Self {
        Self
    }

    fn downcast<'a>(conn: &'a dyn Connection) -> Option<&'a MssqlConnection> {
        conn.as_any().downcast_ref::<MssqlConnection>()
    }

    fn column_type_to_string(ty: ColumnType) -> String {
        match ty {
            ColumnType::Bit | ColumnType::Bitn => "bit",
            ColumnType::Int1 => "tinyint",
            ColumnType::Int2 => "smallint",
            ColumnType::Int4 => "int",
            ColumnType::Int8 | ColumnType::Intn => "bigint",
            ColumnType::Float4 => "real",
            ColumnType::Float8 | ColumnType::Floatn => "float",
            ColumnType::Decimaln | ColumnType::Numericn => "numeric",
            ColumnType::Money | ColumnType::Money4 => "money",
            ColumnType::Datetime
            | ColumnType::Datetime4
            | ColumnType::Datetimen
            | ColumnType::Datetime2 => "datetime",
            ColumnType::Daten => "date",
            ColumnType::Timen => "time",
            ColumnType::DatetimeOffsetn => "datetimeoffset",
            ColumnType::Guid => "uniqueidentifier",
            ColumnType::BigVarChar | ColumnType::Text => "varchar",
            ColumnType::NVarchar | ColumnType::NText => "nvarchar",
            ColumnType::BigChar => "char",
            ColumnType::NChar => "nchar",
            ColumnType::BigBinary | ColumnType::BigVarBin | ColumnType::Image => "varbinary",
            ColumnType::Xml => "xml",
            _ => "sql_variant",
        }
        .to_string()
    }

    fn cell_value(row: &Row, idx: usize, ty: ColumnType) -> CellValue {
        match ty {
            ColumnType::Bit | ColumnType::Bitn => match row.try_get::<bool, _>(idx) {
                Ok(Some(v)) => CellValue::Bool(v),
                _ => CellValue::Null,
            },
            ColumnType::Int1 => match row.try_get::<u8, _>(idx) {
                Ok(Some(v)) => CellValue::Int(v as i64),
                _ => CellValue::Null,
            },
            ColumnType::Int2 => match row.try_get::<i16, _>(idx) {
                Ok(Some(v)) => CellValue::Int(v as i64),
                _ => CellValue::Null,
            },
            ColumnType::Int4 => match row.try_get::<i32, _>(idx) {
                Ok(Some(v)) => CellValue::Int(v as i64),
                _ => CellValue::Null,
            },
            ColumnType::Int8 => match row.try_get::<i64, _>(idx) {
                Ok(Some(v)) => CellValue::Int(v),
                _ => CellValue::Null,
            },
            // Intn width depends on the stored value
            ColumnType::Intn => {
                if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
                    CellValue::Int(v)
                } else if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
                    CellValue::Int(v as i64)
                } else if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
                    CellValue::Int(v as i64)
                } else if let Ok(Some(v)) = row.try_get::<u8, _>(idx) {
                    CellValue::Int(v as i64)
                } else {
                    CellValue::Null
                }
            }
            ColumnType::Float4 => match row.try_get::<f32, _>(idx) {
                Ok(Some(v)) => CellValue::Float(v as f64),
                _ => CellValue::Null,
            },
            ColumnType::Float8 => match row.try_get::<f64, _>(idx) {
                Ok(Some(v)) => CellValue::Float(v),
                _ => CellValue::Null,
            },
            ColumnType::Floatn => {
                if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
                    CellValue::Float(v)
                } else if let Ok(Some(v)) = row.try_get::<f32, _>(idx) {
                    CellValue::Float(v as f64)
                } else {
                    CellValue::Null
                }
            }
            ColumnType::Decimaln | ColumnType::Numericn => {
                match row.try_get::<Numeric, _>(idx) {
                    Ok(Some(v)) => CellValue::Float(f64::from(v)),
                    _ => CellValue::Null,
                }
            }
            ColumnType::Money | ColumnType::Money4 => match row.try_get::<f64, _>(idx) {
                Ok(Some(v)) => CellValue::Float(v),
                _ => CellValue::Null,
            },
            ColumnType::Datetime
            | ColumnType::Datetime4
            | ColumnType::Datetimen
            | ColumnType::Datetime2 => match row.try_get::<chrono::NaiveDateTime, _>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                _ => CellValue::Null,
            },
            ColumnType::Daten => match row.try_get::<chrono::NaiveDate, _>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                _ => CellValue::Null,
            },
            ColumnType::Timen => match row.try_get::<chrono::NaiveTime, _>(idx) {
                Ok(Some(v)) => CellValue::DateTime(v.to_string()),
                _ => CellValue::Null,
            },
            ColumnType::DatetimeOffsetn => {
                match row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
                    Ok(Some(v)) => CellValue::DateTime(v.to_rfc3339()),
                    _ => CellValue::Null,
                }
            }
            ColumnType::Guid => match row.try_get::<tiberius::Uuid, _>(idx) {
                Ok(Some(v)) => CellValue::String(v.to_string()),
                _ => CellValue::Null,
            },
            ColumnType::BigBinary | ColumnType::BigVarBin | ColumnType::Image => {
                match row.try_get::<&[u8], _>(idx) {
                    Ok(Some(v)) => CellValue::Binary(v.to_vec()),
                    _ => CellValue::Null,
                }
            }
            ColumnType::Xml => match row.try_get::<&XmlData, _>(idx) {
                Ok(Some(v)) => CellValue::String(v.to_owned().into_string()),
                _ => CellValue::Null,
            },
            _ => match row.try_get::<&str, _>(idx) {
                Ok(Some(v)) => CellValue::String(v.to_string()),
                _ => CellValue::Null,
            },
        }
    }

    fn rows_to_result(rows: Vec<Row>, elapsed_ms: u64) -> QueryResult {
        let mut result = QueryResult::new();

        if let Some(first) = rows.first() {
            result.columns = first
                .columns()
                .iter()
                .map(|col| ColumnInfo {
                    name: col.name().to_string(),
                    data_type: Self::column_type_to_string(col.column_type()),
                    nullable: true,
                })
                .collect();
        }

        for row in &rows {
            let types: Vec<ColumnType> =
                row.columns().iter().map(|c| c.column_type()).collect();
            result.rows.push(
                types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| Self::cell_value(row, idx, *ty))
                    .collect(),
            );
        }

        result.row_count = result.rows.len();
        result.execution_time_ms = elapsed_ms;
        result
    }
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

const REFLECT_COLUMNS_SQL: &str = "\
    SELECT c.TABLE_SCHEMA,
           c.TABLE_NAME,
           c.COLUMN_NAME,
           c.DATA_TYPE,
           CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS is_nullable,
           c.ORDINAL_POSITION,
           CASE WHEN EXISTS (
               SELECT 1
               FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
               JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                 ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
               WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                 AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA
                 AND tc.TABLE_NAME = c.TABLE_NAME
                 AND kcu.COLUMN_NAME = c.COLUMN_NAME
           ) THEN 1 ELSE 0 END AS is_primary,
           CASE WHEN EXISTS (
               SELECT 1
               FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
               JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                 ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
               WHERE tc.CONSTRAINT_TYPE = 'UNIQUE'
                 AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA
                 AND tc.TABLE_NAME = c.TABLE_NAME
                 AND kcu.COLUMN_NAME = c.COLUMN_NAME
           ) THEN 1 ELSE 0 END AS is_unique
    FROM INFORMATION_SCHEMA.COLUMNS c
    JOIN INFORMATION_SCHEMA.TABLES t
      ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
    WHERE t.TABLE_TYPE = 'BASE TABLE'";

#[async_trait::async_trait]
impl DatabaseDriver for MssqlDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    async fn connect(
        &self,
        _endpoint: &str,
        server: &ServerConfig,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        let host = server
            .host
            .as_deref()
            .ok_or_else(|| ConnectionError::Failed("mssql requires a host".to_string()))?;

        let mut config = Config::new();
        config.host(host);
        config.port(server.port_or_default());
        config.database(&server.database);
        if let (Some(user), Some(password)) = (&server.user, &server.password) {
            config.authentication(AuthMethod::sql_server(user, password));
        }
        config.trust_cert();
        config.encryption(EncryptionLevel::Off);

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ConnectionError::Failed(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| ConnectionError::Failed(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| ConnectionError::Failed(e.to_string()))?;

        Ok(Box::new(MssqlConnection {
            id: uuid::Uuid::new_v4().to_string(),
            client: tokio::sync::Mutex::new(client),
        }))
    }

    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
    ) -> Result<QueryResult, QueryError> {
        let mssql = Self::downcast(conn).ok_or(QueryError::InvalidConnection)?;
        let mut client = mssql.client.lock().await;
        let start = std::time::Instant::now();

        let rows = client
            .simple_query(sql)
            .await
            .map_err(|e| QueryError::Execution(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| QueryError::Execution(e.to_string()))?;

        Ok(Self::rows_to_result(
            rows,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn reflect(
        &self,
        conn: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<TableMeta>, ReflectionError> {
        let mssql = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;
        let mut client = mssql.client.lock().await;

        let rows = match schema {
            Some(name) => {
                let sql = format!(
                    "{} AND c.TABLE_SCHEMA = @P1 \
                     ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION",
                    REFLECT_COLUMNS_SQL
                );
                client
                    .query(sql, &[&name])
                    .await
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                    .into_first_result()
                    .await
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
            }
            None => {
                let sql = format!(
                    "{} ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION",
                    REFLECT_COLUMNS_SQL
                );
                client
                    .simple_query(sql)
                    .await
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                    .into_first_result()
                    .await
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
            }
        };

        let missing =
            || ReflectionError::Introspection("unexpected metadata row shape".to_string());

        let mut order: Vec<(String, String)> = Vec::new();
        let mut grouped: HashMap<(String, String), Vec<ColumnMeta>> = HashMap::new();

        for row in &rows {
            let table_schema = row
                .try_get::<&str, _>(0)
                .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                .ok_or_else(missing)?
                .to_string();
            let table_name = row
                .try_get::<&str, _>(1)
                .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                .ok_or_else(missing)?
                .to_string();

            let key = (table_schema, table_name);
            if !grouped.contains_key(&key) {
                order.push(key.clone());
            }

            let name = row
                .try_get::<&str, _>(2)
                .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                .ok_or_else(missing)?
                .to_string();
            let data_type = row
                .try_get::<&str, _>(3)
                .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                .ok_or_else(missing)?
                .to_string();
            let nullable = row.try_get::<i32, _>(4).ok().flatten().unwrap_or(0) != 0;
            let ordinal = row.try_get::<i32, _>(5).ok().flatten().unwrap_or(0);
            let primary_key = row.try_get::<i32, _>(6).ok().flatten().unwrap_or(0) != 0;
            let unique = row.try_get::<i32, _>(7).ok().flatten().unwrap_or(0) != 0;

            grouped.entry(key).or_default().push(ColumnMeta {
                name,
                data_type,
                nullable,
                primary_key,
                unique,
                ordinal,
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
        let mssql = Self::downcast(conn).ok_or(ReflectionError::InvalidConnection)?;
        let mut client = mssql.client.lock().await;

        let rows = client
            .simple_query(
                "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA \
                 WHERE SCHEMA_NAME NOT IN ('guest', 'INFORMATION_SCHEMA', 'sys') \
                 AND SCHEMA_NAME NOT LIKE 'db[_]%' \
                 ORDER BY SCHEMA_NAME",
            )
            .await
            .map_err(|e| ReflectionError::Introspection(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| ReflectionError::Introspection(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<&str, _>(0)
                    .map_err(|e| ReflectionError::Introspection(e.to_string()))?
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ReflectionError::Introspection("null schema name".to_string())
                    })
            })
            .collect()
    }
}
