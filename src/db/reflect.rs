// Schema Reflection
// Per-schema introspection with failure isolation

use serde::{Deserialize, Serialize};

use crate::db::traits::{Connection, DatabaseDriver, ReflectionError, TableMeta};

/// Raw reflection output: table and column metadata across the requested
/// schemas, before catalog mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reflection {
    pub tables: Vec<TableMeta>,
}

pub struct SchemaReflector;

impl SchemaReflector {
    /// Explicit single-schema boundary: reflect one named schema, or the
    /// entire visible database when `schema` is None.
    pub async fn reflect_schema(
        driver: &dyn DatabaseDriver,
        conn: &dyn Connection,
        schema: Option<&str>,
    ) -> Result<Vec<TableMeta>, ReflectionError> {
        driver.reflect(conn, schema).await
    }

    /// Reflect the requested schemas, isolating failures: a schema whose
    /// reflection fails is logged and contributes nothing, and its siblings
    /// still run. With no schema names, a single whole-database reflection
    /// is performed. Results are merged in schema-name order, so output is
    /// deterministic regardless of completion order.
    pub async fn reflect(
        driver: &dyn DatabaseDriver,
        conn: &dyn Connection,
        schemas: Option<&[String]>,
    ) -> Reflection {
        let mut reflection = Reflection::default();

        match schemas {
            Some(names) if !names.is_empty() => {
                let mut names: Vec<&String> = names.iter().collect();
                names.sort();
                for schema in names {
                    match Self::reflect_schema(driver, conn, Some(schema)).await {
                        Ok(tables) => reflection.tables.extend(tables),
                        Err(err) => {
                            log::error!("error getting metadata for {}: {}", schema, err)
                        }
                    }
                }
            }
            _ => match Self::reflect_schema(driver, conn, None).await {
                Ok(tables) => reflection.tables.extend(tables),
                Err(err) => log::error!("error getting database metadata: {}", err),
            },
        }

        reflection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::traits::{
        ColumnMeta, ConnectionError, Dialect, QueryError, QueryResult,
    };

    struct NullConnection;

    #[async_trait::async_trait]
    impl Connection for NullConnection {
        fn connection_id(&self) -> &str {
            "null"
        }

        async fn is_alive(&self) -> bool {
            true
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    /// Driver whose named schemas either yield one table or fail outright
    struct FlakyDriver {
        failing: Vec<String>,
    }

    fn table_in(schema: Option<&str>) -> TableMeta {
        TableMeta {
            schema: schema.map(str::to_string),
            name: format!("t_{}", schema.unwrap_or("db")),
            columns: vec![ColumnMeta {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
                primary_key: true,
                unique: false,
                ordinal: 1,
            }],
        }
    }

    #[async_trait::async_trait]
    impl DatabaseDriver for FlakyDriver {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn connect(
            &self,
            _endpoint: &str,
            _server: &ServerConfig,
        ) -> Result<Box<dyn Connection>, ConnectionError> {
            Ok(Box::new(NullConnection))
        }

        async fn execute_query(
            &self,
            _conn: &dyn Connection,
            _sql: &str,
        ) -> Result<QueryResult, QueryError> {
            Ok(QueryResult::new())
        }

        async fn reflect(
            &self,
            _conn: &dyn Connection,
            schema: Option<&str>,
        ) -> Result<Vec<TableMeta>, ReflectionError> {
            if let Some(name) = schema {
                if self.failing.iter().any(|f| f == name) {
                    return Err(ReflectionError::Introspection(format!(
                        "schema {} unavailable",
                        name
                    )));
                }
            }
            Ok(vec![table_in(schema)])
        }

        async fn list_schemas(
            &self,
            _conn: &dyn Connection,
        ) -> Result<Vec<String>, ReflectionError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_failing_schema_does_not_abort_siblings() {
        let _ = env_logger::builder().is_test(true).try_init();

        let driver = FlakyDriver {
            failing: vec!["broken".to_string()],
        };
        let conn = NullConnection;
        let schemas = vec!["broken".to_string(), "public".to_string()];

        let reflection = SchemaReflector::reflect(&driver, &conn, Some(&schemas)).await;

        assert_eq!(reflection.tables.len(), 1);
        assert_eq!(reflection.tables[0].schema.as_deref(), Some("public"));
    }

    #[tokio::test]
    async fn test_merge_order_is_schema_name_order() {
        let driver = FlakyDriver { failing: vec![] };
        let conn = NullConnection;
        // Deliberately unsorted input
        let schemas = vec!["zeta".to_string(), "alpha".to_string(), "mid".to_string()];

        let reflection = SchemaReflector::reflect(&driver, &conn, Some(&schemas)).await;

        let order: Vec<_> = reflection
            .tables
            .iter()
            .map(|t| t.schema.clone().unwrap())
            .collect();
        assert_eq!(order, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_no_schemas_reflects_whole_database() {
        let driver = FlakyDriver { failing: vec![] };
        let conn = NullConnection;

        let reflection = SchemaReflector::reflect(&driver, &conn, None).await;

        assert_eq!(reflection.tables.len(), 1);
        assert!(reflection.tables[0].schema.is_none());

        // An empty list behaves like no list at all
        let reflection = SchemaReflector::reflect(&driver, &conn, Some(&[])).await;
        assert_eq!(reflection.tables.len(), 1);
    }

    #[tokio::test]
    async fn test_all_schemas_failing_yields_empty_reflection() {
        let driver = FlakyDriver {
            failing: vec!["a".to_string(), "b".to_string()],
        };
        let conn = NullConnection;
        let schemas = vec!["a".to_string(), "b".to_string()];

        let reflection = SchemaReflector::reflect(&driver, &conn, Some(&schemas)).await;
        assert!(reflection.tables.is_empty());
    }
}
