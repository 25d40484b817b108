use crate::model::ExecutionResult;
use anyhow::{Context, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Tsv,
}

pub fn render(result: &ExecutionResult, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(result),
        ExportFormat::Csv => to_csv(result),
        ExportFormat::Tsv => Ok(to_tsv(result)),
    }
}

/// `{"columns": [...], "rows": [...]}`, pretty-printed.
pub fn to_json(result: &ExecutionResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize result")
}

pub fn to_csv(result: &ExecutionResult) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(
            result
                .columns
                .iter()
                .map(|column| cell_text(row.get(column))),
        )?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e))?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

pub fn to_tsv(result: &ExecutionResult) -> String {
    let mut output = String::new();

    output.push_str(&result.columns.join("\t"));
    output.push('\n');

    for row in &result.rows {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|column| cell_text(row.get(column)).replace(['\t', '\n'], " "))
            .collect();
        output.push_str(&cells.join("\t"));
        output.push('\n');
    }

    output
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
