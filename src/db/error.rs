use std::error::Error as StdError;
use std::fmt;

/// SQLSTATE raised when `statement_timeout` cancels a query.
pub const SQLSTATE_QUERY_CANCELED: &str = "57014";

/// Categorized error types for storage failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE 42601, 42000)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, bad input syntax)
    Execution,
    /// Statement timeout fired
    Timeout,
    /// Transaction state errors (e.g., read-only transaction)
    Transaction,
    /// Connection, pool or protocol errors
    Connection,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Timeout => write!(f, "Timeout"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// Structured storage error with the context PostgreSQL returned.
///
/// Everything in here is for the audit log and server logs; none of it is
/// echoed back to callers.
#[derive(Debug, Clone)]
pub struct DbError {
    pub category: ErrorCategory,
    /// SQLSTATE code, or a short tag for non-database failures
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based character position in the statement, when reported
    pub position: Option<u32>,
}

impl DbError {
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            detail: None,
            hint: None,
            position: None,
        }
    }

    pub fn from_pg_error(err: &tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code().to_string();
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            DbError {
                category: categorize_sqlstate(&code),
                code,
                message: db_err.message().to_string(),
                detail: db_err.detail().map(|s| s.to_string()),
                hint: db_err.hint().map(|s| s.to_string()),
                position,
            }
        } else {
            // Non-database error (connection, protocol, etc.)
            let mut error = DbError::new(ErrorCategory::Connection, "CONNECTION", err.to_string());
            error.detail = err.source().map(|e| e.to_string());
            error
        }
    }

    pub fn from_pool_error(err: &deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(pg) => Self::from_pg_error(pg),
            other => DbError::new(ErrorCategory::Connection, "POOL_UNAVAILABLE", other.to_string()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.category == ErrorCategory::Timeout
    }

    /// Multi-line rendering for logs.
    pub fn display_full(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];
        if !self.code.is_empty() {
            lines.push(format!("  SQLSTATE: {}", self.code));
        }
        if let Some(position) = self.position {
            lines.push(format!("  Position: {}", position));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }
        lines.join("\n")
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for DbError {}

impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        DbError::from_pg_error(&err)
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DbError::from_pool_error(&err)
    }
}

/// Categorize a SQLSTATE code into an ErrorCategory.
pub fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code == SQLSTATE_QUERY_CANCELED {
        return ErrorCategory::Timeout;
    }
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        "42" => {
            if code == "42601" || code == "42000" {
                ErrorCategory::Syntax
            } else {
                ErrorCategory::Semantic
            }
        }
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42P01"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("42703"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("22P02"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("57014"), ErrorCategory::Timeout);
        assert_eq!(categorize_sqlstate("57P01"), ErrorCategory::Execution);
        assert_eq!(categorize_sqlstate("25006"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("XX000"), ErrorCategory::Unknown);
        assert_eq!(categorize_sqlstate(""), ErrorCategory::Unknown);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Timeout.to_string(), "Timeout");
        assert_eq!(ErrorCategory::Semantic.to_string(), "Semantic Error");
    }

    #[test]
    fn test_display_full() {
        let mut err = DbError::new(
            ErrorCategory::Semantic,
            "42P01",
            "relation \"nope\" does not exist",
        );
        err.position = Some(15);
        err.hint = Some("Check the table name.".into());
        let full = err.display_full();
        assert!(full.starts_with("Semantic Error: relation"));
        assert!(full.contains("SQLSTATE: 42P01"));
        assert!(full.contains("Position: 15"));
        assert!(full.contains("Hint: Check the table name."));
        assert_eq!(err.to_string(), "relation \"nope\" does not exist");
    }

    #[test]
    fn test_timeout_flag() {
        let err = DbError::new(
            categorize_sqlstate(SQLSTATE_QUERY_CANCELED),
            SQLSTATE_QUERY_CANCELED,
            "canceling statement due to statement timeout",
        );
        assert!(err.is_timeout());
    }
}
