use super::params::compile_named_params;
use super::safety::check_sql_safety;
use crate::config::ExecutionLimits;
use crate::db::DbError;
use crate::error::GatewayError;
use crate::model::{ExecutionAudit, ExecutionResult, ParamValue, Params, StoredQuery};
use async_trait::async_trait;
use std::time::Instant;

/// A validated, compiled and row-capped statement ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedStatement {
    pub sql: String,
    /// Values for `$1..$n`; the last one is always the row cap.
    pub values: Vec<ParamValue>,
}

/// Per-transaction settings applied by the store before running a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionGuard {
    pub timeout_ms: u64,
    pub read_only: bool,
}

/// Storage used by the gateway.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn find_query(&self, id: i64) -> Result<Option<StoredQuery>, DbError>;

    /// Run `statement` inside its own transaction with the guard applied.
    /// Any failure must leave nothing committed.
    async fn run_bounded(
        &self,
        statement: &BoundedStatement,
        guard: &ExecutionGuard,
    ) -> Result<ExecutionResult, DbError>;

    async fn record_audit(&self, audit: &ExecutionAudit) -> Result<(), DbError>;
}

/// Trim surrounding whitespace and drop a single trailing `;`.
pub fn trim_statement(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed)
}

/// Validate, bind and wrap a stored query without touching the database.
pub fn prepare_statement(
    query: &StoredQuery,
    params: &Params,
    max_rows: i64,
) -> Result<BoundedStatement, GatewayError> {
    let sql = trim_statement(&query.sql);
    check_sql_safety(sql)?;

    let resolved = query.resolve_params(params);
    let compiled = compile_named_params(sql, &resolved)?;

    let wrapped = format!(
        "SELECT * FROM (\n{}\n) AS _q LIMIT ${}",
        compiled.sql,
        compiled.next_position()
    );
    let mut values = compiled.values;
    values.push(ParamValue::Int(max_rows));

    Ok(BoundedStatement {
        sql: wrapped,
        values,
    })
}

/// Runs stored queries through the safety gates and records one audit row
/// per call.
pub struct Gateway<S> {
    store: S,
    limits: ExecutionLimits,
}

impl<S: ExecutionStore> Gateway<S> {
    pub fn new(store: S, limits: ExecutionLimits) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub async fn execute(
        &self,
        query_id: i64,
        params: &Params,
    ) -> Result<ExecutionResult, GatewayError> {
        let started = Instant::now();

        let query = match self.store.find_query(query_id).await {
            Ok(Some(query)) => query,
            Ok(None) => {
                let err = GatewayError::QueryNotFound(query_id);
                tracing::warn!(query_id, "execute rejected: query not found");
                self.audit_rejection(query_id, started, params, &err).await;
                return Err(err);
            }
            Err(db_err) => {
                tracing::error!(query_id, error = %db_err.display_full(), "failed to load query");
                self.audit_db_failure(query_id, started, params, &db_err)
                    .await;
                return Err(GatewayError::Internal);
            }
        };

        let statement = match prepare_statement(&query, params, self.limits.max_result_rows) {
            Ok(statement) => statement,
            Err(err) => {
                tracing::warn!(query_id, code = err.code(), error = %err, "execute rejected");
                self.audit_rejection(query_id, started, params, &err).await;
                return Err(err);
            }
        };
        tracing::debug!(query_id, bound = statement.values.len(), "statement accepted");

        let guard = ExecutionGuard {
            timeout_ms: self.limits.execute_timeout_ms,
            read_only: self.limits.read_only_transactions,
        };

        match self.store.run_bounded(&statement, &guard).await {
            Ok(result) => {
                let duration_ms = elapsed_ms(started);
                tracing::info!(
                    query_id,
                    duration_ms,
                    rows = result.row_count(),
                    "query executed"
                );
                let audit =
                    ExecutionAudit::success(query_id, duration_ms, result.row_count(), params);
                self.record(&audit).await;
                Ok(result)
            }
            Err(db_err) => {
                tracing::warn!(
                    query_id,
                    category = %db_err.category,
                    code = %db_err.code,
                    timeout = db_err.is_timeout(),
                    error = %db_err.display_full(),
                    "query execution failed"
                );
                self.audit_db_failure(query_id, started, params, &db_err)
                    .await;
                Err(GatewayError::ExecutionFailed)
            }
        }
    }

    async fn audit_rejection(
        &self,
        query_id: i64,
        started: Instant,
        params: &Params,
        err: &GatewayError,
    ) {
        let audit = ExecutionAudit::failure(
            query_id,
            elapsed_ms(started),
            params,
            err.code(),
            &err.to_string(),
            self.limits.audit_message_limit,
        );
        self.record(&audit).await;
    }

    async fn audit_db_failure(
        &self,
        query_id: i64,
        started: Instant,
        params: &Params,
        err: &DbError,
    ) {
        let audit = ExecutionAudit::failure(
            query_id,
            elapsed_ms(started),
            params,
            err.code.as_str(),
            &err.message,
            self.limits.audit_message_limit,
        );
        self.record(&audit).await;
    }

    async fn record(&self, audit: &ExecutionAudit) {
        if let Err(err) = self.store.record_audit(audit).await {
            tracing::warn!(
                query_id = audit.query_id,
                error = %err.display_full(),
                "failed to write execution audit"
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
