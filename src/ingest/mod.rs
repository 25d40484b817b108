//! CSV ingestion: parse, infer, normalize, then create the table and its
//! catalog entries atomically.

pub mod ident;
pub mod infer;
mod loader;
pub mod parse;
pub mod plan;

pub use ident::{normalize_identifier, table_base_name, unique_identifiers};
pub use infer::{infer_column_type, ColumnType};
pub use loader::CsvImporter;
pub use parse::{parse_csv, CsvImportError, ParsedCsv};
pub use plan::{ImportPlan, InsertBatch};
