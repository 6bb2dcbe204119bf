// Connection Factory
// Opens live connection handles, selecting the native driver path or the
// bridge gateway path per the requested connection kind

use std::sync::Arc;

use crate::config::{Configuration, ServerConfig};
use crate::db::bridge::BridgeDriver;
use crate::db::drivers::{MssqlDriver, PostgresDriver, SqliteDriver};
use crate::db::registry::DriverRegistry;
use crate::db::resolver;
use crate::db::traits::{ConnectKind, Connection, ConnectionError, DatabaseDriver, Dialect};

/// A live connection paired with the driver that produced it. The same pair
/// serves both reflection and query execution.
pub struct Session {
    pub driver: Arc<dyn DatabaseDriver>,
    pub conn: Box<dyn Connection>,
}

/// Factory for opening connections to configured servers
pub struct ConnectionFactory {
    registry: Arc<DriverRegistry>,
    bridge: Arc<BridgeDriver>,
}

impl ConnectionFactory {
    pub fn new(registry: Arc<DriverRegistry>, bridge: Arc<BridgeDriver>) -> Self {
        Self { registry, bridge }
    }

    /// Factory with the built-in native drivers registered and the default
    /// bridge gateway for IRIS.
    pub async fn with_default_drivers() -> Self {
        let registry = Arc::new(DriverRegistry::new());
        registry.register(Arc::new(SqliteDriver::new())).await;
        registry.register(Arc::new(PostgresDriver::new())).await;
        registry.register(Arc::new(MssqlDriver::new())).await;
        Self::new(registry, Arc::new(BridgeDriver::new(Dialect::Iris)))
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// Open a handle for the named server, or the active source when
    /// `instance` is None. The connection kind string is validated before
    /// any network attempt.
    pub async fn open(
        &self,
        config: &Configuration,
        conn_type: &str,
        instance: Option<&str>,
    ) -> Result<Session, ConnectionError> {
        let kind = match ConnectKind::parse(conn_type) {
            Ok(kind) => kind,
            Err(err) => {
                log::warn!("connection type {} not supported", conn_type);
                return Err(err.into());
            }
        };
        let server = config.resolve(instance)?;
        self.open_server(server, kind).await
    }

    /// Open a handle straight from a descriptor.
    pub async fn open_server(
        &self,
        server: &ServerConfig,
        kind: ConnectKind,
    ) -> Result<Session, ConnectionError> {
        let driver: Arc<dyn DatabaseDriver> = match kind {
            ConnectKind::Native => self.registry.get_driver(server.dialect).await?,
            ConnectKind::Bridge => self.bridge.clone(),
        };

        let endpoint = resolver::endpoint_url(server);
        log::debug!(
            "opening {} connection to server {}",
            driver.driver_name(),
            server.name
        );
        let conn = driver.connect(&endpoint, server).await?;
        Ok(Session { driver, conn })
    }
}
