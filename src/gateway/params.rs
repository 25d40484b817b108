//! `{{name}}` placeholder compilation into positional bind parameters.

use crate::model::{ParamValue, Params};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
}

/// SQL with positional markers plus the values for `$1..$n`, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub values: Vec<ParamValue>,
}

impl CompiledSql {
    /// Index the next appended parameter would get.
    pub fn next_position(&self) -> usize {
        self.values.len() + 1
    }
}

/// Replace every placeholder with `$n`. Each distinct name gets one slot,
/// allocated in order of first appearance.
pub fn compile_named_params(sql: &str, params: &Params) -> Result<CompiledSql, CompileError> {
    let mut values: Vec<ParamValue> = Vec::new();
    let mut position_by_name: HashMap<&str, usize> = HashMap::new();
    let mut compiled = String::with_capacity(sql.len());
    let mut last_end = 0;

    for caps in PLACEHOLDER.captures_iter(sql) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();

        let position = match position_by_name.get(name) {
            Some(&position) => position,
            None => {
                let value = params
                    .get(name)
                    .ok_or_else(|| CompileError::MissingParameter(name.to_string()))?;
                values.push(value.clone());
                position_by_name.insert(name, values.len());
                values.len()
            }
        };

        compiled.push_str(&sql[last_end..whole.start()]);
        compiled.push('$');
        compiled.push_str(&position.to_string());
        last_end = whole.end();
    }
    compiled.push_str(&sql[last_end..]);

    Ok(CompiledSql {
        sql: compiled,
        values,
    })
}

/// Distinct placeholder names in order of first appearance.
pub fn placeholder_names(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(sql) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_no_placeholders() {
        let compiled = compile_named_params("SELECT 1", &Params::new()).unwrap();
        assert_eq!(compiled.sql, "SELECT 1");
        assert!(compiled.values.is_empty());
        assert_eq!(compiled.next_position(), 1);
    }

    #[test]
    fn test_distinct_names_get_sequential_slots() {
        let compiled = compile_named_params(
            "SELECT * FROM t WHERE d >= {{from}} AND d < {{to}}",
            &params(&[("from", "2025-01-01".into()), ("to", "2025-02-01".into())]),
        )
        .unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM t WHERE d >= $1 AND d < $2");
        assert_eq!(
            compiled.values,
            vec![
                ParamValue::Text("2025-01-01".into()),
                ParamValue::Text("2025-02-01".into())
            ]
        );
    }

    #[test]
    fn test_repeated_name_reuses_slot() {
        let compiled = compile_named_params(
            "SELECT {{a}}, {{b}}, {{a}}, {{ a }}",
            &params(&[("a", ParamValue::Int(1)), ("b", ParamValue::Int(2))]),
        )
        .unwrap();
        assert_eq!(compiled.sql, "SELECT $1, $2, $1, $1");
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_missing_parameter_is_named() {
        let err = compile_named_params(
            "SELECT {{present}}, {{absent}}",
            &params(&[("present", ParamValue::Int(1))]),
        )
        .unwrap_err();
        assert_eq!(err, CompileError::MissingParameter("absent".into()));
        assert_eq!(err.to_string(), "missing required parameter: absent");
    }

    #[test]
    fn test_explicit_null_is_bound() {
        let compiled =
            compile_named_params("SELECT {{x}}", &params(&[("x", ParamValue::Null)])).unwrap();
        assert_eq!(compiled.values, vec![ParamValue::Null]);
    }

    #[test]
    fn test_metacharacters_never_reach_sql_text() {
        let hostile = "'); DROP TABLE users; --";
        let compiled = compile_named_params(
            "SELECT * FROM t WHERE name = {{name}}",
            &params(&[("name", hostile.into())]),
        )
        .unwrap();
        assert_eq!(compiled.sql, "SELECT * FROM t WHERE name = $1");
        assert!(!compiled.sql.contains("DROP"));
        assert_eq!(compiled.values, vec![ParamValue::Text(hostile.into())]);
    }

    #[test]
    fn test_malformed_placeholders_are_left_alone() {
        let compiled = compile_named_params(
            "SELECT '{{1abc}}', '{x}', '{{}}'",
            &Params::new(),
        )
        .unwrap();
        assert_eq!(compiled.sql, "SELECT '{{1abc}}', '{x}', '{{}}'");
    }

    #[test]
    fn test_unused_params_are_ignored() {
        let compiled = compile_named_params(
            "SELECT {{a}}",
            &params(&[("a", ParamValue::Int(1)), ("unused", ParamValue::Int(2))]),
        )
        .unwrap();
        assert_eq!(compiled.values, vec![ParamValue::Int(1)]);
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(
            placeholder_names("{{b}} {{a}} {{b}} {{ c }}"),
            vec!["b".to_string(), "a".to_string(), "c".to_string()]
        );
    }
}
