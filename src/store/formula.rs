//! Typed filter formulas
//!
//! The HTTP store renders these to the spreadsheet formula language; the
//! in-memory test store evaluates them directly, so both agree on meaning.

use chrono::NaiveDate;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// `{field}='value'`
    Eq { field: String, value: String },
    /// `FIND('prefix', {field})=1`
    StartsWith { field: String, prefix: String },
    /// `IS_AFTER({field}, 'YYYY-MM-DD')`
    IsAfter { field: String, date: NaiveDate },
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Formula::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Formula::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn is_after(field: impl Into<String>, date: NaiveDate) -> Self {
        Formula::IsAfter {
            field: field.into(),
            date,
        }
    }

    /// Render as a `filterByFormula` expression
    pub fn render(&self) -> String {
        match self {
            Formula::Eq { field, value } => format!("{{{field}}}='{}'", escape(value)),
            Formula::StartsWith { field, prefix } => {
                format!("FIND('{}', {{{field}}})=1", escape(prefix))
            }
            Formula::IsAfter { field, date } => {
                format!("IS_AFTER({{{field}}}, '{}')", date.format("%Y-%m-%d"))
            }
            Formula::And(parts) => format!("AND({})", join(parts)),
            Formula::Or(parts) => format!("OR({})", join(parts)),
        }
    }

    /// Evaluate against a row's fields
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Formula::Eq { field, value } => field_text(fields, field).as_deref() == Some(value),
            Formula::StartsWith { field, prefix } => field_text(fields, field)
                .map(|text| text.starts_with(prefix.as_str()))
                .unwrap_or(false),
            Formula::IsAfter { field, date } => field_text(fields, field)
                .and_then(|text| leading_date(&text))
                .map(|value| value > *date)
                .unwrap_or(false),
            Formula::And(parts) => parts.iter().all(|p| p.matches(fields)),
            Formula::Or(parts) => parts.iter().any(|p| p.matches(fields)),
        }
    }
}

fn join(parts: &[Formula]) -> String {
    parts
        .iter()
        .map(Formula::render)
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Date part of an ISO date or datetime
fn leading_date(text: &str) -> Option<NaiveDate> {
    let head = text.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn field_text(fields: &Map<String, Value>, field: &str) -> Option<String> {
    match fields.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
