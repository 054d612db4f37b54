//! SQL parameter values and placeholder generation.
//!
//! Every literal that reaches the database travels through a
//! [`ParamList`]; nothing user-supplied is ever interpolated into SQL
//! text.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cql_filter::Literal;

/// A typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    /// Geometry literal as WKT; the SQL around it decodes per vendor.
    Geometry(String),
}

impl From<&Literal> for SqlParam {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Int(i) => SqlParam::Int(*i),
            Literal::Float(f) => SqlParam::Float(*f),
            Literal::Text(s) => SqlParam::Text(s.clone()),
            Literal::Bool(b) => SqlParam::Bool(*b),
            Literal::Timestamp(t) => SqlParam::Timestamp(*t),
            Literal::Uuid(u) => SqlParam::Uuid(*u),
        }
    }
}

/// Placeholder syntax per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (Postgres)
    Dollar,
    /// `?` (SQLite, MySQL)
    Question,
    /// `@p1, @p2, ...` (SQL Server)
    AtName,
    /// `:p1, :p2, ...` (Oracle)
    ColonName,
}

/// Ordered parameter collector.
///
/// Parameters are named `p1..pN` in the order they are pushed, which is
/// also placeholder order for every supported style.
#[derive(Debug)]
pub struct ParamList {
    style: PlaceholderStyle,
    params: Vec<(String, SqlParam)>,
}

impl ParamList {
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            params: Vec::new(),
        }
    }

    /// Append a value, returning the placeholder to splice into the SQL.
    pub fn push(&mut self, value: SqlParam) -> String {
        let index = self.params.len() + 1;
        let name = format!("p{}", index);
        self.params.push((name, value));
        match self.style {
            PlaceholderStyle::Dollar => format!("${}", index),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::AtName => format!("@p{}", index),
            PlaceholderStyle::ColonName => format!(":p{}", index),
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, SqlParam)> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_styles() {
        let mut dollar = ParamList::new(PlaceholderStyle::Dollar);
        assert_eq!(dollar.push(SqlParam::Int(1)), "$1");
        assert_eq!(dollar.push(SqlParam::Int(2)), "$2");

        let mut question = ParamList::new(PlaceholderStyle::Question);
        assert_eq!(question.push(SqlParam::Int(1)), "?");
        assert_eq!(question.push(SqlParam::Int(2)), "?");

        let mut at = ParamList::new(PlaceholderStyle::AtName);
        assert_eq!(at.push(SqlParam::Int(1)), "@p1");

        let mut colon = ParamList::new(PlaceholderStyle::ColonName);
        assert_eq!(colon.push(SqlParam::Int(1)), ":p1");
    }

    #[test]
    fn test_params_keep_push_order_and_names() {
        let mut list = ParamList::new(PlaceholderStyle::Dollar);
        list.push(SqlParam::Text("a".into()));
        list.push(SqlParam::Bool(true));

        let params = list.into_vec();
        assert_eq!(params[0].0, "p1");
        assert_eq!(params[1].0, "p2");
        assert_eq!(params[1].1, SqlParam::Bool(true));
    }
}
