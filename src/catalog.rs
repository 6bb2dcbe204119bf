// Catalog Model & Builder
// Canonical instance -> database -> schema -> table -> column hierarchy
// built from raw reflected metadata

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::db::reflect::Reflection;

/// Schema name used when a descriptor declares none and for tables the
/// source reports without a schema
pub const DEFAULT_SCHEMA: &str = "default";

/// Root of the catalog hierarchy. Built fresh per reflection call and
/// immutable once returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub instances: Vec<Instance>,
}

/// One reflected data source, 1:1 with the descriptor used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub host: Option<String>,
    pub databases: Vec<Database>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub schemas: Vec<Schema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub tables: Vec<Table>,
}

impl Schema {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub full_name: String,
    /// Number of owned columns, set once after ingestion completes
    pub field_count: usize,
    pub columns: Vec<Column>,
}

/// Column with denormalized owner names for flat querying
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub instance_name: String,
    pub database_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

pub struct CatalogBuilder;

impl CatalogBuilder {
    /// Map raw reflected metadata into the canonical hierarchy.
    ///
    /// Schemas are pre-created from the descriptor's schema list (or a
    /// single "default" schema). Tables reporting a schema outside that
    /// allow-list are dropped silently; they reflect objects outside the
    /// configured scope, not an error.
    pub fn build(server: &ServerConfig, reflection: &Reflection) -> Catalog {
        let mut instance = Instance {
            name: server.name.clone(),
            host: server.host.clone(),
            databases: Vec::new(),
        };
        let mut database = Database {
            name: server.database.clone(),
            schemas: Vec::new(),
        };

        match &server.schemas {
            Some(names) if !names.is_empty() => {
                for name in names {
                    database.schemas.push(Schema::new(name));
                }
            }
            _ => database.schemas.push(Schema::new(DEFAULT_SCHEMA)),
        }

        for meta in &reflection.tables {
            let schema_name = meta.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);

            // Only schemas declared in the descriptor exist in the hierarchy
            let Some(schema) = database.schemas.iter_mut().find(|s| s.name == schema_name)
            else {
                log::debug!(
                    "skipping table {} outside the configured schemas",
                    meta.full_name()
                );
                continue;
            };

            let mut table = Table {
                name: meta.name.clone(),
                full_name: meta.full_name(),
                field_count: 0,
                columns: Vec::new(),
            };

            for col in &meta.columns {
                table.columns.push(Column {
                    name: col.name.clone(),
                    instance_name: instance.name.clone(),
                    database_name: database.name.clone(),
                    schema_name: schema_name.to_string(),
                    table_name: meta.name.clone(),
                    data_type: col.data_type.clone(),
                    nullable: col.nullable,
                    primary_key: col.primary_key,
                    unique: col.unique,
                });
            }
            table.field_count = table.columns.len();

            schema.tables.push(table);
        }

        instance.databases.push(database);
        Catalog {
            instances: vec![instance],
        }
    }
}
