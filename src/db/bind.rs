//! Text-format bind parameters.
//!
//! Every value is sent in PostgreSQL's text format and the server infers
//! the parameter type from the statement, so the database's own input
//! functions parse dates, numbers and booleans. Values never touch the SQL
//! text.

use crate::model::ParamValue;
use bytes::BytesMut;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct TextParam(Option<String>);

impl TextParam {
    pub fn null() -> Self {
        TextParam(None)
    }

    pub fn text(value: impl Into<String>) -> Self {
        TextParam(Some(value.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl From<&ParamValue> for TextParam {
    fn from(value: &ParamValue) -> Self {
        TextParam(value.to_pg_text())
    }
}

impl ToSql for TextParam {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match &self.0 {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

pub fn to_text_params(values: &[ParamValue]) -> Vec<TextParam> {
    values.iter().map(TextParam::from).collect()
}

/// Borrow a parameter list in the shape `tokio_postgres` expects.
pub fn as_sql_refs(params: &[TextParam]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}
