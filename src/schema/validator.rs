use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use super::records::{Company, CompanyAcquisition, Person, PersonEmployment, Record};
use super::{FieldType, RecordKind, Schema};

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub reason: String,
}

impl FieldIssue {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A payload that does not satisfy its schema. Lists every offending field,
/// not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} record: {}", join_issues(.issues))]
pub struct ValidationError {
    pub kind: RecordKind,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Integer(i32),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

/// Coerced values keyed by field name. Absent optional fields have no entry.
struct ValidatedFields {
    values: HashMap<&'static str, FieldValue>,
}

impl ValidatedFields {
    fn integer(&mut self, name: &str) -> Option<i32> {
        match self.values.remove(name)? {
            FieldValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    fn text(&mut self, name: &str) -> Option<String> {
        match self.values.remove(name)? {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    fn boolean(&mut self, name: &str) -> Option<bool> {
        match self.values.remove(name)? {
            FieldValue::Boolean(value) => Some(value),
            _ => None,
        }
    }

    fn timestamp(&mut self, name: &str) -> Option<DateTime<Utc>> {
        match self.values.remove(name)? {
            FieldValue::Timestamp(value) => Some(value),
            _ => None,
        }
    }
}

/// Validates and sanitises `data` against `schema`, producing a typed record.
///
/// Missing or null optional fields become `None`; fields not named by the
/// schema are ignored.
pub fn validate(schema: &Schema, data: &Map<String, Value>) -> Result<Record, ValidationError> {
    let mut values = HashMap::with_capacity(schema.fields.len());
    let mut issues = Vec::new();

    for spec in schema.fields {
        match data.get(spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    issues.push(FieldIssue::new(spec.name, "field required"));
                }
            }
            Some(raw) => match coerce(spec.ty, raw) {
                Ok(value) => {
                    values.insert(spec.name, value);
                }
                Err(reason) => issues.push(FieldIssue::new(spec.name, reason)),
            },
        }
    }

    if !issues.is_empty() {
        return Err(ValidationError {
            kind: schema.kind,
            issues,
        });
    }

    let mut fields = ValidatedFields { values };
    assemble(schema.kind, &mut fields).ok_or_else(|| ValidationError {
        kind: schema.kind,
        issues: vec![FieldIssue::new("<schema>", "rule set does not match record layout")],
    })
}

fn assemble(kind: RecordKind, fields: &mut ValidatedFields) -> Option<Record> {
    let record = match kind {
        RecordKind::Person => Record::Person(Person {
            person_id: fields.integer("person_id")?,
            name: fields.text("name")?,
        }),
        RecordKind::Company => Record::Company(Company {
            company_id: fields.integer("company_id")?,
            company_name: fields.text("company_name")?,
            headcount: fields.integer("headcount"),
        }),
        RecordKind::CompanyAcquisition => Record::CompanyAcquisition(CompanyAcquisition {
            parent_company_id: fields.integer("parent_company_id")?,
            acquired_company_id: fields.integer("acquired_company_id")?,
            merged_into_parent_company: fields.boolean("merged_into_parent_company")?,
        }),
        RecordKind::PersonEmployment => Record::PersonEmployment(PersonEmployment {
            company_id: fields.integer("company_id")?,
            person_id: fields.integer("person_id")?,
            employment_title: fields.text("employment_title")?,
            start_date: fields.timestamp("start_date"),
            end_date: fields.timestamp("end_date"),
        }),
    };
    Some(record)
}

fn coerce(ty: FieldType, raw: &Value) -> Result<FieldValue, String> {
    match ty {
        FieldType::Integer => coerce_integer(raw).map(FieldValue::Integer),
        FieldType::Text => coerce_text(raw).map(FieldValue::Text),
        FieldType::Boolean => coerce_boolean(raw).map(FieldValue::Boolean),
        FieldType::Timestamp => coerce_timestamp(raw).map(FieldValue::Timestamp),
    }
}

fn coerce_integer(raw: &Value) -> Result<i32, String> {
    let wide = match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                        f as i64
                    }
                    _ => return Err(format!("expected an integer, got {}", n)),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got string {:?}", s))?,
        other => return Err(format!("expected an integer, got {}", json_type(other))),
    };

    i32::try_from(wide).map_err(|_| format!("integer {} is out of 32-bit range", wide))
}

fn coerce_text(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected a string, got {}", json_type(other))),
    }
}

fn coerce_boolean(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("expected a boolean, got {}", n)),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "f" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(format!("expected a boolean, got string {:?}", s)),
        },
        other => Err(format!("expected a boolean, got {}", json_type(other))),
    }
}

fn coerce_timestamp(raw: &Value) -> Result<DateTime<Utc>, String> {
    match raw {
        Value::String(s) => parse_timestamp(s.trim())
            .ok_or_else(|| format!("expected an ISO 8601 timestamp, got {:?}", s)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| format!("expected unix seconds, got {}", n)),
        other => Err(format!("expected a timestamp, got {}", json_type(other))),
    }
}

/// Accepts RFC 3339, naive date-times (taken as UTC) and plain dates
/// (midnight UTC).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
