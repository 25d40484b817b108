use crate::gateway::params::CompileError;
use crate::gateway::safety::SafetyViolation;
use crate::ingest::CsvImportError;
use std::fmt;

/// How an error is reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameters, malformed CSV, size limits.
    ClientInput,
    NotFound,
    /// SQL failed the safety check.
    UnsafeRequest,
    /// The database rejected or timed out the statement.
    ExecutionFailure,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::ClientInput | ErrorKind::UnsafeRequest | ErrorKind::ExecutionFailure => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ClientInput => write!(f, "BAD_REQUEST"),
            ErrorKind::NotFound => write!(f, "NOT_FOUND"),
            ErrorKind::UnsafeRequest => write!(f, "UNSAFE_REQUEST"),
            ErrorKind::ExecutionFailure => write!(f, "EXECUTION_FAILED"),
            ErrorKind::Internal => write!(f, "INTERNAL_SERVER_ERROR"),
        }
    }
}

/// Errors surfaced by `execute` and `import_csv`.
///
/// Display strings are safe to show callers: database and driver detail is
/// logged and audited, never carried here.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("query {0} not found")]
    QueryNotFound(i64),

    #[error("unsafe SQL: {0}")]
    UnsafeSql(#[from] SafetyViolation),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("query execution failed")]
    ExecutionFailed,

    #[error(transparent)]
    Csv(#[from] CsvImportError),

    #[error("CSV import failed")]
    ImportFailed,

    #[error("internal server error")]
    Internal,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::QueryNotFound(_) => ErrorKind::NotFound,
            GatewayError::UnsafeSql(_) => ErrorKind::UnsafeRequest,
            GatewayError::MissingParameter(_) | GatewayError::Csv(_) => ErrorKind::ClientInput,
            GatewayError::ExecutionFailed => ErrorKind::ExecutionFailure,
            GatewayError::ImportFailed | GatewayError::Internal => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    /// Stable machine-readable code, also written to the audit log for
    /// failures that happen before the statement reaches the database.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::QueryNotFound(_) => "QUERY_NOT_FOUND",
            GatewayError::UnsafeSql(violation) => violation.code(),
            GatewayError::MissingParameter(_) => "MISSING_PARAMETER",
            GatewayError::ExecutionFailed => "EXECUTION_FAILED",
            GatewayError::Csv(err) => err.code(),
            GatewayError::ImportFailed => "IMPORT_FAILED",
            GatewayError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<CompileError> for GatewayError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::MissingParameter(name) => GatewayError::MissingParameter(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_status() {
        assert_eq!(GatewayError::QueryNotFound(1).status(), 404);
        assert_eq!(
            GatewayError::UnsafeSql(SafetyViolation::MultiStatement).kind(),
            ErrorKind::UnsafeRequest
        );
        assert_eq!(GatewayError::MissingParameter("x".into()).status(), 400);
        assert_eq!(GatewayError::ExecutionFailed.status(), 400);
        assert_eq!(GatewayError::ImportFailed.status(), 500);
        assert_eq!(
            GatewayError::Csv(CsvImportError::EmptyFile).kind(),
            ErrorKind::ClientInput
        );
    }

    #[test]
    fn test_messages_name_the_problem() {
        assert_eq!(
            GatewayError::MissingParameter("from".into()).to_string(),
            "missing required parameter: from"
        );
        assert_eq!(
            GatewayError::UnsafeSql(SafetyViolation::ForbiddenKeyword("drop".into())).to_string(),
            "unsafe SQL: forbidden keyword: drop"
        );
        assert_eq!(
            GatewayError::ExecutionFailed.to_string(),
            "query execution failed"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            GatewayError::UnsafeSql(SafetyViolation::OnlySelectAllowed).code(),
            "ONLY_SELECT"
        );
        assert_eq!(GatewayError::QueryNotFound(3).code(), "QUERY_NOT_FOUND");
        assert_eq!(
            GatewayError::from(CompileError::MissingParameter("a".into())).code(),
            "MISSING_PARAMETER"
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::ExecutionFailure.to_string(), "EXECUTION_FAILED");
        assert_eq!(ErrorKind::Internal.to_string(), "INTERNAL_SERVER_ERROR");
    }
}
