use super::parse::parse_csv;
use super::plan::{generate_table_name, ImportPlan, WIDGET_NAME, WIDGET_TYPE};
use crate::config::IngestLimits;
use crate::db::bind::as_sql_refs;
use crate::db::{catalog, checkout, DbError};
use crate::error::GatewayError;
use crate::model::CsvImportResult;
use deadpool_postgres::Pool;
use std::time::Instant;

/// Turns an uploaded CSV into a table plus a query, a dashboard and a
/// table widget, all in one transaction.
#[derive(Clone)]
pub struct CsvImporter {
    pool: Pool,
    limits: IngestLimits,
}

impl CsvImporter {
    pub fn new(pool: Pool, limits: IngestLimits) -> Self {
        Self { pool, limits }
    }

    pub async fn import_csv(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<CsvImportResult, GatewayError> {
        let started = Instant::now();

        let parsed = parse_csv(bytes, self.limits.max_rows).map_err(|err| {
            tracing::warn!(file = original_name, code = err.code(), error = %err, "CSV rejected");
            err
        })?;
        let plan = ImportPlan::new(
            original_name,
            parsed,
            &self.limits,
            generate_table_name(original_name),
        );
        tracing::debug!(
            file = original_name,
            table = %plan.qualified_table(),
            columns = plan.columns.len(),
            rows = plan.rows.len(),
            "CSV import planned"
        );

        match self.load(&plan).await {
            Ok(result) => {
                tracing::info!(
                    file = original_name,
                    table = %plan.qualified_table(),
                    rows = plan.rows.len(),
                    query_id = result.query_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "CSV imported"
                );
                Ok(result)
            }
            Err(err) => {
                tracing::error!(
                    file = original_name,
                    table = %plan.qualified_table(),
                    category = %err.category,
                    code = %err.code,
                    error = %err.display_full(),
                    "CSV import failed, rolled back"
                );
                Err(GatewayError::ImportFailed)
            }
        }
    }

    async fn load(&self, plan: &ImportPlan) -> Result<CsvImportResult, DbError> {
        let mut object = checkout(&self.pool).await?;
        let client: &mut tokio_postgres::Client = &mut object;
        catalog::ensure_schema(client, &plan.schema).await?;
        let tx = client.transaction().await?;

        tx.batch_execute(&plan.create_schema_sql()).await?;
        tx.batch_execute(&plan.create_table_sql()).await?;
        for batch in plan.batches() {
            tx.execute(batch.sql.as_str(), &as_sql_refs(&batch.values))
                .await?;
        }

        let name = plan.display_name();
        let query_id = catalog::insert_query(&tx, &name, &plan.select_sql(), &[]).await?;
        let dashboard_id = catalog::insert_dashboard(&tx, &name).await?;
        let widget_id =
            catalog::insert_widget(&tx, dashboard_id, query_id, WIDGET_NAME, WIDGET_TYPE).await?;

        tx.commit().await?;

        Ok(CsvImportResult {
            schema_name: plan.schema.clone(),
            table_name: plan.table.clone(),
            query_id,
            dashboard_id,
            widget_id,
        })
    }
}
