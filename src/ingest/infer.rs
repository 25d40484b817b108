//! Column type inference over sampled CSV values.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+$").unwrap());
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+(?:\.[0-9]+)?$").unwrap());
static DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap());
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9]{4}-[0-9]{2}-[0-9]{2})[T ]([0-9]{2}):([0-9]{2})(?::([0-9]{2})(?:\.[0-9]+)?)?(?:Z|[+-]([0-9]{2}):?([0-9]{2}))?$",
    )
    .unwrap()
});

/// PostgreSQL column type chosen for an imported column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Date => "date",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_type())
    }
}

/// Integer digits that also fit a `bigint`; longer runs are left to the
/// float rule.
fn is_integer(value: &str) -> bool {
    INTEGER.is_match(value) && value.parse::<i64>().is_ok()
}

fn is_number(value: &str) -> bool {
    NUMBER.is_match(value)
}

fn is_boolean(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")
}

fn is_date(value: &str) -> bool {
    DATE.is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn is_timestamp(value: &str) -> bool {
    let Some(caps) = TIMESTAMP.captures(value) else {
        return false;
    };
    let field = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());

    if NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").is_err() {
        return false;
    }
    let (Some(hour), Some(minute)) = (field(2), field(3)) else {
        return false;
    };
    let second = field(4).unwrap_or(0);
    if NaiveTime::from_hms_opt(hour, minute, second).is_none() {
        return false;
    }
    match (field(5), field(6)) {
        (Some(offset_hours), Some(offset_minutes)) => offset_hours < 24 && offset_minutes < 60,
        _ => true,
    }
}

/// Pick the narrowest type every trimmed, non-empty sample satisfies.
///
/// Rules are tried in order: integer, float, boolean, timestamp, date. No
/// non-empty samples, or no matching rule, gives text.
pub fn infer_column_type<S: AsRef<str>>(samples: &[S]) -> ColumnType {
    let values: Vec<&str> = samples
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect();
    if values.is_empty() {
        return ColumnType::Text;
    }

    let rules: [(fn(&str) -> bool, ColumnType); 5] = [
        (is_integer, ColumnType::Integer),
        (is_number, ColumnType::Float),
        (is_boolean, ColumnType::Boolean),
        (is_timestamp, ColumnType::Timestamp),
        (is_date, ColumnType::Date),
    ];
    for (matches, column_type) in rules {
        if values.iter().all(|v| matches(v)) {
            return column_type;
        }
    }
    ColumnType::Text
}
