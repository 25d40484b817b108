use csv::ReaderBuilder;

const BOM: char = '\u{feff}';

/// Rejections for uploaded CSV content. All are caller mistakes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvImportError {
    #[error("CSV file is empty")]
    EmptyFile,

    #[error("failed to parse CSV: {0}")]
    ParseError(String),

    #[error("CSV needs a header row and at least one data row")]
    InsufficientData,

    #[error("CSV header row is invalid")]
    InvalidHeader,

    #[error("too many rows (max {limit})")]
    TooManyRows { limit: usize },
}

impl CsvImportError {
    pub fn code(&self) -> &'static str {
        match self {
            CsvImportError::EmptyFile => "CSV_EMPTY",
            CsvImportError::ParseError(_) => "CSV_PARSE_ERROR",
            CsvImportError::InsufficientData => "CSV_INSUFFICIENT_DATA",
            CsvImportError::InvalidHeader => "CSV_INVALID_HEADER",
            CsvImportError::TooManyRows { .. } => "CSV_TOO_MANY_ROWS",
        }
    }
}

/// Header cells (trimmed, not yet normalized) and data rows, each row
/// exactly as wide as the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ParsedCsv {
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Values of one column across the first `limit` rows.
    pub fn column_sample(&self, column: usize, limit: usize) -> Vec<&str> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| row.get(column).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// Parse raw upload bytes. Invalid UTF-8 is replaced rather than rejected,
/// a leading BOM is dropped, blank lines are skipped and ragged rows are
/// padded or cut to the header width.
///
/// Reading stops as soon as more than `max_rows` data rows are seen.
pub fn parse_csv(bytes: &[u8], max_rows: usize) -> Result<ParsedCsv, CsvImportError> {
    let decoded = String::from_utf8_lossy(bytes);
    let text = decoded.strip_prefix(BOM).unwrap_or(&decoded);
    if text.trim().is_empty() {
        return Err(CsvImportError::EmptyFile);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<String>> = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| CsvImportError::ParseError(e.to_string()))?;
        if is_blank_line(&record) {
            continue;
        }

        match &headers {
            None => {
                headers = Some(record.iter().map(|h| h.trim().to_string()).collect());
            }
            Some(header) => {
                if rows.len() == max_rows {
                    return Err(CsvImportError::TooManyRows { limit: max_rows });
                }
                let width = header.len();
                let mut row: Vec<String> = record.iter().take(width).map(String::from).collect();
                row.resize(width, String::new());
                rows.push(row);
            }
        }
    }

    let headers = headers.ok_or(CsvImportError::InsufficientData)?;
    if rows.is_empty() {
        return Err(CsvImportError::InsufficientData);
    }
    if headers.is_empty() {
        return Err(CsvImportError::InvalidHeader);
    }

    Ok(ParsedCsv { headers, rows })
}

fn is_blank_line(record: &csv::StringRecord) -> bool {
    record.len() == 1 && record.get(0).is_some_and(|field| field.trim().is_empty())
}
