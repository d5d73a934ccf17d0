use chrono::{DateTime, Utc};

use super::RecordKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub person_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Company {
    pub company_id: i32,
    pub company_name: String,
    pub headcount: Option<i32>,
}

/// Marks `acquired_company_id` as acquired by `parent_company_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyAcquisition {
    pub parent_company_id: i32,
    pub acquired_company_id: i32,
    pub merged_into_parent_company: bool,
}

/// Employment edge between a company and a person. Title and dates belong to
/// the edge, not to either entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonEmployment {
    pub company_id: i32,
    pub person_id: i32,
    pub employment_title: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// A validated record of one of the four kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Person(Person),
    Company(Company),
    CompanyAcquisition(CompanyAcquisition),
    PersonEmployment(PersonEmployment),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Person(_) => RecordKind::Person,
            Record::Company(_) => RecordKind::Company,
            Record::CompanyAcquisition(_) => RecordKind::CompanyAcquisition,
            Record::PersonEmployment(_) => RecordKind::PersonEmployment,
        }
    }
}

impl From<Person> for Record {
    fn from(person: Person) -> Self {
        Record::Person(person)
    }
}

impl From<Company> for Record {
    fn from(company: Company) -> Self {
        Record::Company(company)
    }
}

impl From<CompanyAcquisition> for Record {
    fn from(acquisition: CompanyAcquisition) -> Self {
        Record::CompanyAcquisition(acquisition)
    }
}

impl From<PersonEmployment> for Record {
    fn from(employment: PersonEmployment) -> Self {
        Record::PersonEmployment(employment)
    }
}
