//! The DDL/DML an import will run, built as data before any I/O.

use super::ident::{table_base_name, unique_identifiers};
use super::infer::{infer_column_type, ColumnType};
use super::parse::ParsedCsv;
use crate::config::IngestLimits;
use crate::db::bind::TextParam;
use crate::db::catalog::{qualified_name, quote_ident};
use chrono::Utc;
use rand::Rng;

pub const WIDGET_NAME: &str = "CSV table";
pub const WIDGET_TYPE: &str = "table";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

/// One multi-row INSERT and its bind values, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBatch {
    pub sql: String,
    pub values: Vec<TextParam>,
    pub row_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub original_name: String,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<String>>,
    pub rows_per_batch: usize,
}

/// `<base>_<unix millis>_<6 hex chars>` for a fresh import table.
pub fn generate_table_name(file_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!(
        "{}_{}_{:06x}",
        table_base_name(file_name),
        Utc::now().timestamp_millis(),
        suffix
    )
}

/// Rows per INSERT so one statement stays under `max_params` binds.
pub fn rows_per_batch(column_count: usize, max_params: usize, max_rows: usize) -> usize {
    let by_params = max_params / column_count.max(1);
    by_params.min(max_rows).max(1)
}

impl ImportPlan {
    pub fn new(original_name: &str, parsed: ParsedCsv, limits: &IngestLimits, table: String) -> Self {
        let names = unique_identifiers(&parsed.headers);
        let columns: Vec<ColumnSpec> = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| ColumnSpec {
                name,
                column_type: infer_column_type(&parsed.column_sample(idx, limits.sample_rows)),
            })
            .collect();
        let rows_per_batch =
            rows_per_batch(columns.len(), limits.max_batch_params, limits.max_batch_rows);

        Self {
            original_name: original_name.to_string(),
            schema: limits.schema.clone(),
            table,
            columns,
            rows: parsed.rows,
            rows_per_batch,
        }
    }

    pub fn qualified_table(&self) -> String {
        qualified_name(&self.schema, &self.table)
    }

    /// Name shared by the generated query and dashboard.
    pub fn display_name(&self) -> String {
        format!("CSV: {}", self.original_name)
    }

    pub fn create_schema_sql(&self) -> String {
        format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.schema))
    }

    pub fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({})", self.qualified_table(), columns)
    }

    /// The stored query created for the imported table.
    pub fn select_sql(&self) -> String {
        format!("SELECT * FROM {}", self.qualified_table())
    }

    pub fn batches(&self) -> impl Iterator<Item = InsertBatch> + '_ {
        let table = self.qualified_table();
        let column_list = self
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let width = self.columns.len();

        self.rows.chunks(self.rows_per_batch).map(move |chunk| {
            let mut values = Vec::with_capacity(chunk.len() * width);
            let mut tuples = Vec::with_capacity(chunk.len());
            for (row_idx, row) in chunk.iter().enumerate() {
                let placeholders = (0..width)
                    .map(|col| format!("${}", row_idx * width + col + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                tuples.push(format!("({})", placeholders));
                values.extend((0..width).map(|col| cell_param(row.get(col))));
            }
            InsertBatch {
                sql: format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    table,
                    column_list,
                    tuples.join(", ")
                ),
                values,
                row_count: chunk.len(),
            }
        })
    }
}

/// Blank cells load as NULL; anything else goes to the server verbatim.
fn cell_param(cell: Option<&String>) -> TextParam {
    match cell {
        Some(value) if !value.trim().is_empty() => TextParam::text(value.as_str()),
        _ => TextParam::null(),
    }
}
