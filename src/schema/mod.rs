//! Schema registry for ingested change records.
//!
//! Every envelope names one of four record kinds in its `type` field. The
//! registry maps that tag to the rule set used by the
//! [`validator`](crate::schema::validator) and reports unknown tags as `None`
//! so the caller can log and move on.
//!
//! ```rust
//! use entity_ingest::schema::{self, RecordKind};
//!
//! let schema = schema::lookup("Company").unwrap();
//! assert_eq!(schema.kind, RecordKind::Company);
//! assert!(schema::lookup("Bogus").is_none());
//! ```

pub mod records;
pub mod validator;


use std::fmt;

pub use records::{Company, CompanyAcquisition, Person, PersonEmployment, Record};
pub use validator::{validate, FieldIssue, ValidationError};

/// The four record variants carried by the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Person,
    Company,
    CompanyAcquisition,
    PersonEmployment,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Person,
        RecordKind::Company,
        RecordKind::CompanyAcquisition,
        RecordKind::PersonEmployment,
    ];

    /// Wire tag as it appears in the envelope's `type` field.
    pub fn tag(self) -> &'static str {
        match self {
            RecordKind::Person => "Person",
            RecordKind::Company => "Company",
            RecordKind::CompanyAcquisition => "CompanyAcquisition",
            RecordKind::PersonEmployment => "PersonEmployment",
        }
    }

    /// Tags are matched exactly; `person` is not `Person`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            RecordKind::Person => &PERSON,
            RecordKind::Company => &COMPANY,
            RecordKind::CompanyAcquisition => &COMPANY_ACQUISITION,
            RecordKind::PersonEmployment => &PERSON_EMPLOYMENT,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 32-bit signed integer.
    Integer,
    Text,
    Boolean,
    /// Point in time, normalised to UTC.
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Text => "string",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    /// Optional fields validate to `None` when absent or null.
    pub required: bool,
}

impl FieldSpec {
    const fn required(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, required: true }
    }

    const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, required: false }
    }
}

/// Validation rule set for one record kind.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub kind: RecordKind,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().filter(|spec| spec.required).map(|spec| spec.name)
    }
}

static PERSON: Schema = Schema {
    kind: RecordKind::Person,
    fields: &[
        FieldSpec::required("person_id", FieldType::Integer),
        FieldSpec::required("name", FieldType::Text),
    ],
};

static COMPANY: Schema = Schema {
    kind: RecordKind::Company,
    fields: &[
        FieldSpec::required("company_id", FieldType::Integer),
        FieldSpec::required("company_name", FieldType::Text),
        FieldSpec::optional("headcount", FieldType::Integer),
    ],
};

static COMPANY_ACQUISITION: Schema = Schema {
    kind: RecordKind::CompanyAcquisition,
    fields: &[
        FieldSpec::required("parent_company_id", FieldType::Integer),
        FieldSpec::required("acquired_company_id", FieldType::Integer),
        FieldSpec::required("merged_into_parent_company", FieldType::Boolean),
    ],
};

static PERSON_EMPLOYMENT: Schema = Schema {
    kind: RecordKind::PersonEmployment,
    fields: &[
        FieldSpec::required("company_id", FieldType::Integer),
        FieldSpec::required("person_id", FieldType::Integer),
        FieldSpec::required("employment_title", FieldType::Text),
        FieldSpec::optional("start_date", FieldType::Timestamp),
        FieldSpec::optional("end_date", FieldType::Timestamp),
    ],
};

/// Returns the rule set for `tag`, or `None` when no schema exists for it.
pub fn lookup(tag: &str) -> Option<&'static Schema> {
    RecordKind::from_tag(tag).map(RecordKind::schema)
}
