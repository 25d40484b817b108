use super::error::DbError;
use crate::model::{ExecutionAudit, ExecutionRecord, ParamDef, StoredQuery};
use tokio_postgres::{Client, Row, Transaction};

/// Advisory lock key serializing concurrent `migrate` calls.
const MIGRATION_LOCK_KEY: i64 = 0x6461_7368_7371_6c;

const CATALOG_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS queries (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    sql         TEXT NOT NULL,
    param_defs  JSONB NOT NULL DEFAULT '[]'::jsonb,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS dashboards (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS widgets (
    id            BIGSERIAL PRIMARY KEY,
    dashboard_id  BIGINT NOT NULL REFERENCES dashboards(id) ON DELETE CASCADE,
    query_id      BIGINT NOT NULL REFERENCES queries(id) ON DELETE RESTRICT,
    name          TEXT NOT NULL,
    type          TEXT NOT NULL,
    config        JSONB NOT NULL DEFAULT '{}'::jsonb,
    position_x    INTEGER NOT NULL DEFAULT 0,
    position_y    INTEGER NOT NULL DEFAULT 0,
    width         INTEGER NOT NULL DEFAULT 6,
    height        INTEGER NOT NULL DEFAULT 4,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- query_id has no foreign key: unknown ids are audited too.
CREATE TABLE IF NOT EXISTS query_executions (
    id             BIGSERIAL PRIMARY KEY,
    query_id       BIGINT NOT NULL,
    duration_ms    BIGINT NOT NULL,
    row_count      BIGINT NOT NULL,
    params         JSONB NOT NULL DEFAULT '{}'::jsonb,
    error_code     TEXT,
    error_message  TEXT,
    executed_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS query_executions_query_id_idx
    ON query_executions (query_id, executed_at DESC);
"#;

/// Create the catalog tables if they do not exist yet.
pub async fn migrate(client: &mut Client) -> Result<(), DbError> {
    let tx = client.transaction().await?;
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])
        .await?;
    tx.batch_execute(CATALOG_DDL).await?;
    tx.commit().await?;
    Ok(())
}

/// Create `schema` if missing. Concurrent `CREATE SCHEMA IF NOT EXISTS`
/// calls can still collide on the catalog's unique index, so this takes the
/// same lock as `migrate`.
pub async fn ensure_schema(client: &mut Client, schema: &str) -> Result<(), DbError> {
    let tx = client.transaction().await?;
    tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])
        .await?;
    tx.batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
        .await?;
    tx.commit().await?;
    Ok(())
}

/// A malformed `param_defs` document means the query runs without declared
/// defaults; the parse error is logged so missing-parameter failures can be
/// traced back to it.
fn parse_param_defs(query_id: i64, raw: serde_json::Value) -> Vec<ParamDef> {
    match serde_json::from_value(raw) {
        Ok(defs) => defs,
        Err(err) => {
            tracing::warn!(
                query_id,
                error = %err,
                "stored param_defs are malformed, ignoring declared defaults"
            );
            Vec::new()
        }
    }
}

fn query_from_row(row: &Row) -> StoredQuery {
    let id: i64 = row.get("id");
    let param_defs = parse_param_defs(id, row.get("param_defs"));
    StoredQuery {
        id,
        name: row.get("name"),
        sql: row.get("sql"),
        param_defs,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn find_query(client: &Client, id: i64) -> Result<Option<StoredQuery>, DbError> {
    let row = client
        .query_opt(
            r#"
            SELECT id, name, sql, param_defs, created_at, updated_at
            FROM queries
            WHERE id = $1
            "#,
            &[&id],
        )
        .await?;
    Ok(row.as_ref().map(query_from_row))
}

pub async fn insert_query(
    client: &Transaction<'_>,
    name: &str,
    sql: &str,
    param_defs: &[ParamDef],
) -> Result<i64, DbError> {
    let defs = serde_json::to_value(param_defs).unwrap_or_else(|_| serde_json::json!([]));
    let row = client
        .query_one(
            r#"
            INSERT INTO queries (name, sql, param_defs)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
            &[&name, &sql, &defs],
        )
        .await?;
    Ok(row.get("id"))
}

pub async fn insert_dashboard(client: &Transaction<'_>, name: &str) -> Result<i64, DbError> {
    let row = client
        .query_one(
            "INSERT INTO dashboards (name) VALUES ($1) RETURNING id",
            &[&name],
        )
        .await?;
    Ok(row.get("id"))
}

pub async fn insert_widget(
    client: &Transaction<'_>,
    dashboard_id: i64,
    query_id: i64,
    name: &str,
    widget_type: &str,
) -> Result<i64, DbError> {
    let config = serde_json::json!({});
    let row = client
        .query_one(
            r#"
            INSERT INTO widgets (dashboard_id, query_id, name, type, config)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
            &[&dashboard_id, &query_id, &name, &widget_type, &config],
        )
        .await?;
    Ok(row.get("id"))
}

pub async fn insert_audit(client: &Client, audit: &ExecutionAudit) -> Result<(), DbError> {
    client
        .execute(
            r#"
            INSERT INTO query_executions
                (query_id, duration_ms, row_count, params, error_code, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &audit.query_id,
                &audit.duration_ms,
                &audit.row_count,
                &audit.params,
                &audit.error_code,
                &audit.error_message,
            ],
        )
        .await?;
    Ok(())
}

/// Newest-first audit rows for one query.
pub async fn recent_executions(
    client: &Client,
    query_id: i64,
    limit: i64,
) -> Result<Vec<ExecutionRecord>, DbError> {
    let rows = client
        .query(
            r#"
            SELECT id, query_id, duration_ms, row_count, params,
                   error_code, error_message, executed_at
            FROM query_executions
            WHERE query_id = $1
            ORDER BY executed_at DESC, id DESC
            LIMIT $2
            "#,
            &[&query_id, &limit],
        )
        .await?;

    let records = rows
        .iter()
        .map(|row| ExecutionRecord {
            id: row.get("id"),
            audit: ExecutionAudit {
                query_id: row.get("query_id"),
                duration_ms: row.get("duration_ms"),
                row_count: row.get("row_count"),
                params: row.get("params"),
                error_code: row.get("error_code"),
                error_message: row.get("error_message"),
            },
            executed_at: row.get("executed_at"),
        })
        .collect();

    Ok(records)
}

/// Double-quote an identifier for use in generated DDL/DML.
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamValue;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("sales"), "\"sales\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(
            qualified_name("csv_schema", "sales_1_ab12cd"),
            "\"csv_schema\".\"sales_1_ab12cd\""
        );
    }

    #[test]
    fn test_parse_param_defs() {
        let defs = parse_param_defs(
            1,
            serde_json::json!([{"name": "from", "type": "date", "default": "2024-01-01"}]),
        );
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "from");
        assert_eq!(defs[0].default, Some(ParamValue::from("2024-01-01")));

        assert!(parse_param_defs(2, serde_json::json!({"name": "from"})).is_empty());
        assert!(parse_param_defs(3, serde_json::json!([{"name": "x", "type": "nope"}])).is_empty());
        assert!(parse_param_defs(4, serde_json::json!([])).is_empty());
    }

    #[test]
    fn test_catalog_ddl_is_idempotent() {
        for statement in CATALOG_DDL.split(';').filter(|s| !s.trim().is_empty()) {
            let head = statement
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty() && !l.starts_with("--"))
                .unwrap_or_default();
            assert!(head.contains("IF NOT EXISTS"), "{head}");
        }
    }
}
