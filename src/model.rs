use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single scalar parameter value supplied by a caller.
///
/// Arrays and objects are not scalars and fail to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// PostgreSQL text-format representation, or `None` for SQL NULL.
    pub fn to_pg_text(&self) -> Option<String> {
        match self {
            ParamValue::Null => None,
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::Int(i) => Some(i.to_string()),
            ParamValue::Float(f) => Some(f.to_string()),
            ParamValue::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_pg_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "NULL"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

/// Named parameters for one execution.
///
/// Ordered by name, not by the caller's order. Audit `params` documents are
/// built in this order.
pub type Params = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Date,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

/// A user-authored query from the catalog. `sql` is never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuery {
    pub id: i64,
    pub name: String,
    pub sql: String,
    pub param_defs: Vec<ParamDef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredQuery {
    /// Caller params with declared defaults filled in for absent names.
    pub fn resolve_params(&self, supplied: &Params) -> Params {
        let mut resolved = supplied.clone();
        for def in &self.param_defs {
            if let Some(default) = &def.default {
                resolved
                    .entry(def.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        resolved
    }
}

/// One result row, keyed by column name in result-set order.
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ExecutionResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// One row of the execution audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionAudit {
    pub query_id: i64,
    pub duration_ms: i64,
    pub row_count: i64,
    pub params: serde_json::Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl ExecutionAudit {
    pub fn success(query_id: i64, duration_ms: i64, row_count: usize, params: &Params) -> Self {
        Self {
            query_id,
            duration_ms,
            row_count: row_count as i64,
            params: params_json(params),
            error_code: None,
            error_message: None,
        }
    }

    /// `message` is cut to `message_limit` characters.
    pub fn failure(
        query_id: i64,
        duration_ms: i64,
        params: &Params,
        code: impl Into<String>,
        message: &str,
        message_limit: usize,
    ) -> Self {
        Self {
            query_id,
            duration_ms,
            row_count: 0,
            params: params_json(params),
            error_code: Some(code.into()),
            error_message: Some(message.chars().take(message_limit).collect()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

fn params_json(params: &Params) -> serde_json::Value {
    serde_json::to_value(params).unwrap_or(serde_json::Value::Null)
}

/// An audit row read back from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub audit: ExecutionAudit,
    pub executed_at: DateTime<Utc>,
}

/// The four artifacts created by one CSV import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvImportResult {
    pub schema_name: String,
    pub table_name: String,
    pub query_id: i64,
    pub dashboard_id: i64,
    pub widget_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stored(defs: Vec<ParamDef>) -> StoredQuery {
        StoredQuery {
            id: 7,
            name: "sales".to_string(),
            sql: "SELECT 1".to_string(),
            param_defs: defs,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_param_value_deserializes_scalars() {
        let params: Params =
            serde_json::from_str(r#"{"a": null, "b": true, "c": 3, "d": 1.5, "e": "x"}"#).unwrap();
        assert_eq!(params["a"], ParamValue::Null);
        assert_eq!(params["b"], ParamValue::Bool(true));
        assert_eq!(params["c"], ParamValue::Int(3));
        assert_eq!(params["d"], ParamValue::Float(1.5));
        assert_eq!(params["e"], ParamValue::Text("x".into()));
    }

    #[test]
    fn test_param_value_rejects_non_scalars() {
        assert!(serde_json::from_str::<Params>(r#"{"a": [1, 2]}"#).is_err());
        assert!(serde_json::from_str::<Params>(r#"{"a": {"b": 1}}"#).is_err());
    }

    #[test]
    fn test_pg_text() {
        assert_eq!(ParamValue::Null.to_pg_text(), None);
        assert_eq!(ParamValue::Bool(false).to_pg_text().as_deref(), Some("false"));
        assert_eq!(ParamValue::Int(-4).to_pg_text().as_deref(), Some("-4"));
        assert_eq!(
            ParamValue::Text("'; DROP TABLE x; --".into()).to_pg_text().as_deref(),
            Some("'; DROP TABLE x; --")
        );
    }

    #[test]
    fn test_param_def_wire_shape() {
        let json = r#"[{"name":"from","label":"From","type":"date","required":true,"default":"2025-01-01"}]"#;
        let defs: Vec<ParamDef> = serde_json::from_str(json).unwrap();
        assert_eq!(defs[0].param_type, ParamType::Date);
        assert_eq!(defs[0].default, Some(ParamValue::Text("2025-01-01".into())));
    }

    #[test]
    fn test_resolve_params_fills_defaults_only_when_absent() {
        let query = stored(vec![
            ParamDef {
                name: "from".into(),
                label: None,
                param_type: ParamType::Date,
                required: None,
                default: Some("2025-01-01".into()),
            },
            ParamDef {
                name: "limit".into(),
                label: None,
                param_type: ParamType::Number,
                required: None,
                default: None,
            },
        ]);
        let mut supplied = Params::new();
        supplied.insert("other".into(), ParamValue::Int(1));
        let resolved = query.resolve_params(&supplied);
        assert_eq!(resolved["from"], ParamValue::Text("2025-01-01".into()));
        assert!(!resolved.contains_key("limit"));

        supplied.insert("from".into(), "2030-12-31".into());
        let resolved = query.resolve_params(&supplied);
        assert_eq!(resolved["from"], ParamValue::Text("2030-12-31".into()));
    }

    #[test]
    fn test_failure_audit_truncates_message() {
        let long = "x".repeat(5000);
        let audit = ExecutionAudit::failure(1, 12, &Params::new(), "57014", &long, 2000);
        assert_eq!(audit.row_count, 0);
        assert_eq!(audit.error_message.as_ref().unwrap().chars().count(), 2000);
        assert!(!audit.is_success());
    }

    #[test]
    fn test_audit_params_are_sorted_by_name() {
        let mut params = Params::new();
        params.insert("zone".into(), ParamValue::from("eu"));
        params.insert("from".into(), ParamValue::from("2024-01-01"));
        params.insert("limit".into(), ParamValue::Int(10));

        let audit = ExecutionAudit::success(1, 3, 0, &params);
        let keys: Vec<&str> = audit
            .params
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["from", "limit", "zone"]);
        assert_eq!(
            audit.params.to_string(),
            r#"{"from":"2024-01-01","limit":10,"zone":"eu"}"#
        );
    }

    #[test]
    fn test_import_result_serialization() {
        let result = CsvImportResult {
            schema_name: "csv_schema".into(),
            table_name: "sales_1_abcdef".into(),
            query_id: 1,
            dashboard_id: 2,
            widget_id: 3,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["schemaName"], "csv_schema");
        assert_eq!(json["widgetId"], 3);
    }
}
