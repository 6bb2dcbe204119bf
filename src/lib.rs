// dbatlas - normalized catalog construction over relational data sources
// Resolves configured servers to endpoints, opens native or bridge
// connections, reflects schema metadata, and maps it into a canonical
// instance -> database -> schema -> table -> column hierarchy.

pub mod catalog;
pub mod config;
pub mod db;
pub mod export;

pub use catalog::{Catalog, CatalogBuilder, DEFAULT_SCHEMA};
pub use config::{ConfigError, Configuration, ServerConfig};
pub use db::{
    ConnectionFactory, Dialect, DriverRegistry, QueryExecutor, QueryRequest, SchemaReflector,
    Session,
};

use db::traits::ConnectionError;

/// Open the named server (or the active source) and build its catalog.
///
/// Connection problems propagate; reflection problems do not. A schema that
/// fails to reflect is logged and simply absent from the result, so a
/// partially reachable source still yields a usable catalog.
pub async fn load_catalog(
    factory: &ConnectionFactory,
    config: &Configuration,
    conn_type: &str,
    instance: Option<&str>,
) -> Result<Catalog, ConnectionError> {
    let server = config.resolve(instance)?;
    let session = factory.open(config, conn_type, instance).await?;

    let reflection = SchemaReflector::reflect(
        session.driver.as_ref(),
        session.conn.as_ref(),
        server.schemas.as_deref(),
    )
    .await;

    Ok(CatalogBuilder::build(server, &reflection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::traits::DatabaseDriver;
    use crate::db::SqliteDriver;

    fn scratch_db_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dbatlas-test-{}.db", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_load_catalog_end_to_end() {
        let path = scratch_db_path();
        let database = path.to_str().unwrap().to_string();

        let driver = SqliteDriver::new();
        let server = ServerConfig::new("scratch", Dialect::Sqlite, database.clone());
        let conn = driver
            .connect(&format!("sqlite:///{}", database), &server)
            .await
            .unwrap();
        driver
            .execute_query(
                conn.as_ref(),
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL)",
            )
            .await
            .unwrap();
        drop(conn);

        let config = Configuration {
            servers: vec![server],
            src_server: Some("scratch".to_string()),
        };
        let factory = ConnectionFactory::with_default_drivers().await;

        let catalog = load_catalog(&factory, &config, "native", None)
            .await
            .unwrap();

        let instance = &catalog.instances[0];
        assert_eq!(instance.name, "scratch");
        let schema = &instance.databases[0].schemas[0];
        assert_eq!(schema.name, DEFAULT_SCHEMA);
        assert_eq!(schema.tables.len(), 1);

        let orders = &schema.tables[0];
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.field_count, 2);
        assert!(orders.columns.iter().any(|c| c.primary_key));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_load_catalog_rejects_unknown_instance() {
        let factory = ConnectionFactory::with_default_drivers().await;
        let config = Configuration {
            servers: vec![ServerConfig::new("mem", Dialect::Sqlite, ":memory:")],
            src_server: None,
        };

        assert!(load_catalog(&factory, &config, "native", Some("nope"))
            .await
            .is_err());
    }
}
