//! Query execution gateway: safety check, parameter binding, bounded
//! execution and auditing for stored queries.

pub mod execute;
pub mod params;
pub mod safety;

pub use execute::{
    prepare_statement, trim_statement, BoundedStatement, ExecutionGuard, ExecutionStore, Gateway,
};
pub use params::{compile_named_params, placeholder_names, CompileError, CompiledSql};
pub use safety::{check_sql_safety, strip_comments, SafetyReport, SafetyViolation};
