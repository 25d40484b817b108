use crate::model::{ExecutionResult, ResultRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use std::error::Error;
use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;
use tokio_postgres::{Column, Row};

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Exact decimal text of a NUMERIC value.
    Numeric(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(Value),
    Array(Vec<CellValue>),
}

impl CellValue {
    /// JSON shape returned to dashboard clients.
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Int16(i) => serde_json::json!(*i),
            CellValue::Int32(i) => serde_json::json!(*i),
            CellValue::Int64(i) => serde_json::json!(*i),
            CellValue::Float32(f) => float_json(*f as f64),
            CellValue::Float64(f) => float_json(*f),
            CellValue::Numeric(s) | CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Bytes(b) => Value::String(hex_bytes(b)),
            CellValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            CellValue::Time(t) => Value::String(t.to_string()),
            CellValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            CellValue::TimestampTz(dt) => Value::String(dt.to_rfc3339()),
            CellValue::Json(j) => j.clone(),
            CellValue::Array(items) => Value::Array(items.iter().map(CellValue::to_json).collect()),
        }
    }
}

// NaN and infinities have no JSON number form.
fn float_json(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// NUMERIC decoded from its binary wire form into exact decimal text.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericText(pub String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        decode_numeric(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Layout: ndigits, weight, sign, dscale (all 16-bit), then ndigits
/// base-10000 digits. The value is sum(digit[i] * 10000^(weight - i)).
fn decode_numeric(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err("numeric value too short".into());
    }
    let read_u16 = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);
    let ndigits = read_u16(0) as usize;
    let weight = read_u16(2) as i16 as i32;
    let sign = read_u16(4);
    let dscale = read_u16(6) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    if raw.len() < 8 + ndigits * 2 {
        return Err("numeric digits truncated".into());
    }
    let digits: Vec<u16> = (0..ndigits).map(|i| read_u16(8 + i * 2)).collect();
    let digit_at = |i: i32| -> u16 {
        if i < 0 {
            0
        } else {
            digits.get(i as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", digit_at(i));
            } else {
                let _ = write!(out, "{:04}", digit_at(i));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit_at(i));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Types without a native Rust mapping, rendered the way `psql` shows them.
#[derive(Debug, Clone, PartialEq)]
pub struct WireText(pub String);

impl<'a> FromSql<'a> for WireText {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let text = match *ty {
            Type::INTERVAL => decode_interval(raw)?,
            Type::INET | Type::CIDR => decode_inet(raw)?,
            Type::MONEY => decode_money(raw)?,
            Type::MACADDR | Type::MACADDR8 => decode_macaddr(raw)?,
            // Enum labels and xml travel as plain UTF-8.
            _ => std::str::from_utf8(raw)?.to_string(),
        };
        Ok(WireText(text))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INTERVAL
                | Type::INET
                | Type::CIDR
                | Type::MONEY
                | Type::MACADDR
                | Type::MACADDR8
                | Type::XML
        ) || matches!(ty.kind(), Kind::Enum(_))
    }
}

fn read_i32(raw: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn read_i64(raw: &[u8], at: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[at..at + 8]);
    i64::from_be_bytes(buf)
}

const USECS_PER_SEC: i64 = 1_000_000;
const USECS_PER_MINUTE: i64 = 60 * USECS_PER_SEC;
const USECS_PER_HOUR: i64 = 60 * USECS_PER_MINUTE;

/// Layout: microseconds (i64), days (i32), months (i32). Output follows the
/// server's default `postgres` IntervalStyle, e.g. `1 year 2 mons 3 days
/// 04:05:06.5` or `-1 days +02:00:00`.
fn decode_interval(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() != 16 {
        return Err("interval value has wrong length".into());
    }
    let micros = read_i64(raw, 0);
    let days = read_i32(raw, 8);
    let months = read_i32(raw, 12);

    let mut out = String::new();
    let mut is_zero = true;
    let mut is_before = false;
    for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if value == 0 {
            continue;
        }
        let _ = write!(
            out,
            "{}{}{} {}{}",
            if is_zero { "" } else { " " },
            if is_before && value > 0 { "+" } else { "" },
            value,
            unit,
            if value != 1 { "s" } else { "" }
        );
        is_before = value < 0;
        is_zero = false;
    }

    if is_zero || micros != 0 {
        let hours = micros / USECS_PER_HOUR;
        let minutes = (micros % USECS_PER_HOUR) / USECS_PER_MINUTE;
        let seconds = (micros % USECS_PER_MINUTE) / USECS_PER_SEC;
        let fraction = (micros % USECS_PER_SEC).unsigned_abs();
        let sign = if micros < 0 {
            "-"
        } else if is_before {
            "+"
        } else {
            ""
        };
        let _ = write!(
            out,
            "{}{}{:02}:{:02}:{:02}",
            if is_zero { "" } else { " " },
            sign,
            hours.unsigned_abs(),
            minutes.unsigned_abs(),
            seconds.unsigned_abs()
        );
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
    }
    Ok(out)
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Layout: family, mask bits, is_cidr flag, address length, address bytes.
/// A host address drops its mask; a network always shows it.
fn decode_inet(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() < 4 {
        return Err("inet value too short".into());
    }
    let (family, bits, is_cidr, len) = (raw[0], raw[1], raw[2] != 0, raw[3] as usize);
    let addr = raw.get(4..4 + len).ok_or("inet address truncated")?;

    let (text, max_bits) = match family {
        PGSQL_AF_INET => {
            let mut octets = [0u8; 4];
            octets[..len.min(4)].copy_from_slice(&addr[..len.min(4)]);
            (Ipv4Addr::from(octets).to_string(), 32)
        }
        PGSQL_AF_INET6 => {
            let mut octets = [0u8; 16];
            octets[..len.min(16)].copy_from_slice(&addr[..len.min(16)]);
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        other => return Err(format!("unknown inet family {}", other).into()),
    };
    if is_cidr || bits != max_bits {
        Ok(format!("{}/{}", text, bits))
    } else {
        Ok(text)
    }
}

/// Cents as a signed 64-bit integer. Rendered as a plain decimal with two
/// fraction digits, without the server's currency symbol.
fn decode_money(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() != 8 {
        return Err("money value has wrong length".into());
    }
    let cents = read_i64(raw, 0);
    let abs = cents.unsigned_abs();
    Ok(format!(
        "{}{}.{:02}",
        if cents < 0 { "-" } else { "" },
        abs / 100,
        abs % 100
    ))
}

fn decode_macaddr(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    if raw.len() != 6 && raw.len() != 8 {
        return Err("macaddr value has wrong length".into());
    }
    let parts: Vec<String> = raw.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(parts.join(":"))
}

/// Column names and JSON rows, in result-set order.
pub fn rows_to_result(columns: &[Column], rows: &[Row]) -> ExecutionResult {
    let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    let rows = rows
        .iter()
        .map(|row| {
            let mut record = ResultRow::new();
            for (idx, column) in row.columns().iter().enumerate() {
                record.insert(
                    column.name().to_string(),
                    extract_value(row, idx, column.type_()).to_json(),
                );
            }
            record
        })
        .collect();
    ExecutionResult {
        columns: names,
        rows,
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn get_array<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> CellValue
where
    T: FromSql<'a>,
    F: Fn(T) -> CellValue,
{
    match get::<Vec<Option<T>>>(row, idx) {
        Some(items) => CellValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&wrap).unwrap_or(CellValue::Null))
                .collect(),
        ),
        None => CellValue::Null,
    }
}

pub fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    let value = match *pg_type {
        Type::BOOL => get(row, idx).map(CellValue::Bool),
        Type::INT2 => get(row, idx).map(CellValue::Int16),
        Type::INT4 => get(row, idx).map(CellValue::Int32),
        Type::INT8 => get(row, idx).map(CellValue::Int64),
        Type::FLOAT4 => get(row, idx).map(CellValue::Float32),
        Type::FLOAT8 => get(row, idx).map(CellValue::Float64),
        Type::NUMERIC => get::<NumericText>(row, idx).map(|n| CellValue::Numeric(n.0)),
        Type::BYTEA => get(row, idx).map(CellValue::Bytes),
        Type::DATE => get(row, idx).map(CellValue::Date),
        Type::TIME => get(row, idx).map(CellValue::Time),
        Type::TIMESTAMP => get(row, idx).map(CellValue::DateTime),
        Type::TIMESTAMPTZ => get(row, idx).map(CellValue::TimestampTz),
        Type::JSON | Type::JSONB => get(row, idx).map(CellValue::Json),
        Type::BOOL_ARRAY => return get_array(row, idx, CellValue::Bool),
        Type::INT2_ARRAY => return get_array(row, idx, CellValue::Int16),
        Type::INT4_ARRAY => return get_array(row, idx, CellValue::Int32),
        Type::INT8_ARRAY => return get_array(row, idx, CellValue::Int64),
        Type::OID => get::<u32>(row, idx).map(|oid| CellValue::Int64(oid as i64)),
        Type::UUID => get::<Uuid>(row, idx).map(|u| CellValue::Text(u.to_string())),
        Type::FLOAT4_ARRAY => return get_array(row, idx, CellValue::Float32),
        Type::FLOAT8_ARRAY => return get_array(row, idx, CellValue::Float64),
        Type::NUMERIC_ARRAY => {
            return get_array(row, idx, |n: NumericText| CellValue::Numeric(n.0))
        }
        Type::DATE_ARRAY => return get_array(row, idx, CellValue::Date),
        Type::TIME_ARRAY => return get_array(row, idx, CellValue::Time),
        Type::TIMESTAMP_ARRAY => return get_array(row, idx, CellValue::DateTime),
        Type::TIMESTAMPTZ_ARRAY => return get_array(row, idx, CellValue::TimestampTz),
        Type::JSON_ARRAY | Type::JSONB_ARRAY => return get_array(row, idx, CellValue::Json),
        Type::UUID_ARRAY => return get_array(row, idx, |u: Uuid| CellValue::Text(u.to_string())),
        _ => return extract_textual(row, idx, pg_type),
    };
    value.unwrap_or(CellValue::Null)
}

/// Text-like columns (text, varchar, name, citext, ...), types rendered via
/// [`WireText`], and arrays of either.
fn extract_textual(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    if <String as FromSql>::accepts(pg_type) {
        return get(row, idx).map(CellValue::Text).unwrap_or(CellValue::Null);
    }
    if WireText::accepts(pg_type) {
        return get::<WireText>(row, idx)
            .map(|w| CellValue::Text(w.0))
            .unwrap_or(CellValue::Null);
    }
    if let Kind::Array(member) = pg_type.kind() {
        if <String as FromSql>::accepts(member) {
            return get_array(row, idx, CellValue::Text);
        }
        if WireText::accepts(member) {
            return get_array(row, idx, |w: WireText| CellValue::Text(w.0));
        }
    }
    tracing::debug!(
        column = row.columns()[idx].name(),
        pg_type = pg_type.name(),
        "unsupported column type, returning null"
    );
    CellValue::Null
}
