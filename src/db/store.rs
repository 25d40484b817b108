use super::bind::{as_sql_refs, to_text_params, TextParam};
use super::catalog;
use super::error::DbError;
use super::pool::checkout;
use super::value::rows_to_result;
use crate::gateway::{BoundedStatement, ExecutionGuard, ExecutionStore};
use crate::model::{ExecutionAudit, ExecutionRecord, ExecutionResult, StoredQuery};
use async_trait::async_trait;
use deadpool_postgres::Pool;

/// `ExecutionStore` over a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), DbError> {
        let mut object = checkout(&self.pool).await?;
        let client: &mut tokio_postgres::Client = &mut object;
        catalog::migrate(client).await
    }

    pub async fn recent_executions(
        &self,
        query_id: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionRecord>, DbError> {
        let object = checkout(&self.pool).await?;
        catalog::recent_executions(&object, query_id, limit).await
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn find_query(&self, id: i64) -> Result<Option<StoredQuery>, DbError> {
        let object = checkout(&self.pool).await?;
        catalog::find_query(&object, id).await
    }

    async fn run_bounded(
        &self,
        statement: &BoundedStatement,
        guard: &ExecutionGuard,
    ) -> Result<ExecutionResult, DbError> {
        let mut object = checkout(&self.pool).await?;
        let client: &mut tokio_postgres::Client = &mut object;
        let tx = client.transaction().await?;

        if guard.read_only {
            tx.batch_execute("SET TRANSACTION READ ONLY").await?;
        }
        let timeout = TextParam::text(guard.timeout_ms.to_string());
        tx.execute(
            "SELECT set_config('statement_timeout', $1, true)",
            &[&timeout],
        )
        .await?;

        let prepared = tx.prepare(&statement.sql).await?;
        let values = to_text_params(&statement.values);
        let rows = tx.query(&prepared, &as_sql_refs(&values)).await?;
        let result = rows_to_result(prepared.columns(), &rows);

        // Dropping `tx` on any early return above rolls it back.
        tx.commit().await?;
        Ok(result)
    }

    async fn record_audit(&self, audit: &ExecutionAudit) -> Result<(), DbError> {
        let object = checkout(&self.pool).await?;
        catalog::insert_audit(&object, audit).await
    }
}
