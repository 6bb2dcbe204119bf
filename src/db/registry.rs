// Driver Registry
// Maps dialects to the drivers that can serve them

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::db::traits::{ConnectionError, DatabaseDriver, Dialect};

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: RwLock<HashMap<Dialect, Arc<dyn DatabaseDriver>>>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a driver under its dialect
    pub async fn register(&self, driver: Arc<dyn DatabaseDriver>) {
        let dialect = driver.dialect();
        let mut drivers = self.drivers.write().await;
        drivers.insert(dialect, driver);
        log::debug!("registered driver for {:?}", dialect);
    }

    /// Get the driver for a dialect
    pub async fn get_driver(&self, dialect: Dialect) -> Result<Arc<dyn DatabaseDriver>, ConnectionError> {
        let drivers = self.drivers.read().await;
        drivers
            .get(&dialect)
            .cloned()
            .ok_or(ConnectionError::DriverNotFound(dialect))
    }

    /// All dialects with a registered driver
    pub async fn supported_dialects(&self) -> Vec<Dialect> {
        let drivers = self.drivers.read().await;
        drivers.keys().copied().collect()
    }

    /// Check whether a dialect has a registered driver
    pub async fn has_driver(&self, dialect: Dialect) -> bool {
        let drivers = self.drivers.read().await;
        drivers.contains_key(&dialect)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::traits::{
        Connection, QueryError, QueryResult, ReflectionError, TableMeta,
    };

    struct MockDriver;

    #[async_trait::async_trait]
    impl DatabaseDriver for MockDriver {
        fn dialect(&self) -> Dialect {
            Dialect::Mssql
        }

        async fn connect(
            &self,
            _endpoint: &str,
            _server: &ServerConfig,
        ) -> Result<Box<dyn Connection>, ConnectionError> {
            Err(ConnectionError::Failed("mock".to_string()))
        }

        async fn execute_query(
            &self,
            _conn: &dyn Connection,
            _sql: &str,
        ) -> Result<QueryResult, QueryError> {
            Err(QueryError::Execution("mock".to_string()))
        }

        async fn reflect(
            &self,
            _conn: &dyn Connection,
            _schema: Option<&str>,
        ) -> Result<Vec<TableMeta>, ReflectionError> {
            Err(ReflectionError::Introspection("mock".to_string()))
        }

        async fn list_schemas(
            &self,
            _conn: &dyn Connection,
        ) -> Result<Vec<String>, ReflectionError> {
            Err(ReflectionError::Introspection("mock".to_string()))
        }
    }

    #[tokio::test]
    async fn test_register_and_get_driver() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(MockDriver)).await;

        assert!(registry.has_driver(Dialect::Mssql).await);
        assert!(registry.get_driver(Dialect::Mssql).await.is_ok());
        assert!(matches!(
            registry.get_driver(Dialect::Postgres).await,
            Err(ConnectionError::DriverNotFound(Dialect::Postgres))
        ));
    }

    #[tokio::test]
    async fn test_supported_dialects() {
        let registry = DriverRegistry::new();
        registry.register(Arc::new(MockDriver)).await;

        assert_eq!(registry.supported_dialects().await, vec![Dialect::Mssql]);
    }
}
