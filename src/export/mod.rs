// Export Module
// Flattens tabular query results into text formats

pub mod csv;

pub use csv::CsvExporter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options for customizing flattened output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Include column headers as the first line
    pub include_headers: bool,
    /// Delimiter (default: comma)
    pub delimiter: Option<String>,
    /// Quote character (default: double quote)
    pub quote_char: Option<String>,
    /// Render NULL values as the string "NULL" instead of empty
    pub null_as_string: bool,
    /// Maximum rows to emit (None = all rows)
    pub max_rows: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: Some(",".to_string()),
            quote_char: Some("\"".to_string()),
            null_as_string: true,
            max_rows: None,
        }
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
