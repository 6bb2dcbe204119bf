// Database Module
// Connection resolution, driver dispatch, introspection, and ad hoc queries

pub mod bridge;
pub mod drivers;
pub mod factory;
pub mod query;
pub mod reflect;
pub mod registry;
pub mod resolver;
pub mod traits;

pub use bridge::{BridgeDriver, BridgeRequest, BridgeResponse};
pub use drivers::{MssqlDriver, PostgresDriver, SqliteDriver};
pub use factory::{ConnectionFactory, Session};
pub use query::{OutputMode, QueryExecutor, QueryOutput, QueryRequest};
pub use reflect::{Reflection, SchemaReflector};
pub use registry::DriverRegistry;
pub use resolver::{endpoint_url, parse_endpoint, resolve_endpoint, Endpoint};
pub use traits::{
    CellValue, ColumnInfo, ColumnMeta, ConnectKind, Connection, ConnectionError, DatabaseDriver,
    Dialect, QueryError, QueryResult, ReflectionError, TableMeta,
};
