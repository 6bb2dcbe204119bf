// CSV Flattening
// Renders a tabular query result as a CSV string

use std::io::Write;

use super::{ExportError, ExportOptions};
use crate::db::traits::{CellValue, ColumnInfo};

/// CSV exporter for query results
pub struct CsvExporter {
    options: ExportOptions,
}

impl CsvExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn with_default_options() -> Self {
        Self {
            options: ExportOptions::default(),
        }
    }

    /// Render columns and rows to a CSV string
    pub fn export_to_string(
        &self,
        columns: &[ColumnInfo],
        rows: &[Vec<CellValue>],
    ) -> Result<String, ExportError> {
        let mut output = Vec::new();
        self.write_csv(&mut output, columns, rows)?;
        String::from_utf8(output).map_err(|e| ExportError::SerializationError(e.to_string()))
    }

    fn write_csv<W: Write>(
        &self,
        writer: &mut W,
        columns: &[ColumnInfo],
        rows: &[Vec<CellValue>],
    ) -> Result<(), ExportError> {
        let delimiter = self.delimiter();
        let quote = self.quote_char();
        let max_rows = self.options.max_rows.unwrap_or(usize::MAX);

        if self.options.include_headers {
            let header: Vec<String> = columns
                .iter()
                .map(|col| self.escape_field(&col.name, delimiter, quote))
                .collect();
            writeln!(writer, "{}", header.join(&delimiter.to_string()))?;
        }

        for row in rows.iter().take(max_rows) {
            let fields: Vec<String> = row
                .iter()
                .map(|cell| self.format_cell(cell, delimiter, quote))
                .collect();
            writeln!(writer, "{}", fields.join(&delimiter.to_string()))?;
        }

        Ok(())
    }

    fn format_cell(&self, value: &CellValue, delimiter: char, quote: char) -> String {
        match value {
            CellValue::Null => {
                if self.options.null_as_string {
                    "NULL".to_string()
                } else {
                    String::new()
                }
            }
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => {
                // Floats without unnecessary precision
                if f.fract() == 0.0 {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            CellValue::String(s) => self.escape_field(s, delimiter, quote),
            CellValue::DateTime(dt) => self.escape_field(dt, delimiter, quote),
            CellValue::Binary(bytes) => {
                let hex = bytes
                    .iter()
                    .take(100)
                    .map(|b| format!("{:02X}", b))
                    .collect::<String>();
                if bytes.len() > 100 {
                    format!("0x{}...", hex)
                } else {
                    format!("0x{}", hex)
                }
            }
        }
    }

    fn escape_field(&self, value: &str, delimiter: char, quote: char) -> String {
        let needs_quoting = value.contains(delimiter)
            || value.contains(quote)
            || value.contains('\n')
            || value.contains('\r');

        if needs_quoting {
            // Quotes escape by doubling
            let escaped = value.replace(quote, &format!("{}{}", quote, quote));
            format!("{}{}{}", quote, escaped, quote)
        } else {
            value.to_string()
        }
    }

    fn delimiter(&self) -> char {
        self.options
            .delimiter
            .as_ref()
            .and_then(|s| s.chars().next())
            .unwrap_or(',')
    }

    fn quote_char(&self) -> char {
        self.options
            .quote_char
            .as_ref()
            .and_then(|s| s.chars().next())
            .unwrap_or('"')
    }
}
