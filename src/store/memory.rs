use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{RecordStore, StoreError};
use crate::schema::{Company, CompanyAcquisition, Person, PersonEmployment, Record};

/// Company row including the acquisition columns written by
/// [`CompanyAcquisition`] records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRow {
    pub company: Company,
    pub acquired_by: Option<i32>,
    pub merged_into_parent_company: Option<bool>,
}

#[derive(Debug, Default)]
struct MemoryState {
    people: BTreeMap<i32, Person>,
    companies: BTreeMap<i32, CompanyRow>,
    employment: BTreeMap<(i32, i32), PersonEmployment>,
    committed: Vec<Record>,
    write_attempts: u32,
    pending_transient: u32,
}

/// In-process [`RecordStore`] with the same key and reference rules as the
/// PostgreSQL tables. Clones share state, so a test can keep a handle while
/// the ingest loop owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with [`StoreError::Transient`]
    /// before touching any state.
    pub fn fail_next_transient(&self, count: u32) {
        self.lock().pending_transient = count;
    }

    /// Records committed so far, in commit order.
    pub fn committed(&self) -> Vec<Record> {
        self.lock().committed.clone()
    }

    pub fn write_attempts(&self) -> u32 {
        self.lock().write_attempts
    }

    pub fn person(&self, person_id: i32) -> Option<Person> {
        self.lock().people.get(&person_id).cloned()
    }

    pub fn company(&self, company_id: i32) -> Option<CompanyRow> {
        self.lock().companies.get(&company_id).cloned()
    }

    pub fn employment(&self, company_id: i32, person_id: i32) -> Option<PersonEmployment> {
        self.lock().employment.get(&(company_id, person_id)).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn apply(&mut self, record: &Record) -> Result<(), StoreError> {
        match record {
            Record::Person(person) => self.insert_person(person),
            Record::Company(company) => self.insert_company(company),
            Record::CompanyAcquisition(acquisition) => self.acquire(acquisition),
            Record::PersonEmployment(employment) => self.employ(employment),
        }
    }

    fn insert_person(&mut self, person: &Person) -> Result<(), StoreError> {
        if self.people.contains_key(&person.person_id) {
            return Err(StoreError::Duplicate(format!(
                "person {} already exists",
                person.person_id
            )));
        }
        self.people.insert(person.person_id, person.clone());
        Ok(())
    }

    fn insert_company(&mut self, company: &Company) -> Result<(), StoreError> {
        if self.companies.contains_key(&company.company_id) {
            return Err(StoreError::Duplicate(format!(
                "company {} already exists",
                company.company_id
            )));
        }
        self.companies.insert(
            company.company_id,
            CompanyRow {
                company: company.clone(),
                acquired_by: None,
                merged_into_parent_company: None,
            },
        );
        Ok(())
    }

    fn acquire(&mut self, acquisition: &CompanyAcquisition) -> Result<(), StoreError> {
        if !self.companies.contains_key(&acquisition.parent_company_id) {
            return Err(StoreError::MissingReference(format!(
                "company {} does not exist",
                acquisition.parent_company_id
            )));
        }
        let row = self
            .companies
            .get_mut(&acquisition.acquired_company_id)
            .ok_or_else(|| {
                StoreError::MissingReference(format!(
                    "company {} does not exist",
                    acquisition.acquired_company_id
                ))
            })?;
        row.acquired_by = Some(acquisition.parent_company_id);
        row.merged_into_parent_company = Some(acquisition.merged_into_parent_company);
        Ok(())
    }

    fn employ(&mut self, employment: &PersonEmployment) -> Result<(), StoreError> {
        if !self.companies.contains_key(&employment.company_id) {
            return Err(StoreError::MissingReference(format!(
                "company {} does not exist",
                employment.company_id
            )));
        }
        if !self.people.contains_key(&employment.person_id) {
            return Err(StoreError::MissingReference(format!(
                "person {} does not exist",
                employment.person_id
            )));
        }
        self.employment.insert(
            (employment.company_id, employment.person_id),
            employment.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn write(&mut self, record: &Record) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.write_attempts += 1;

        if state.pending_transient > 0 {
            state.pending_transient -= 1;
            return Err(StoreError::Transient(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        state.apply(record)?;
        state.committed.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: i32) -> Record {
        Record::Person(Person {
            person_id: id,
            name: format!("person-{}", id),
        })
    }

    fn company(id: i32) -> Record {
        Record::Company(Company {
            company_id: id,
            company_name: format!("company-{}", id),
            headcount: None,
        })
    }

    fn employment(company_id: i32, person_id: i32, title: &str) -> Record {
        Record::PersonEmployment(PersonEmployment {
            company_id,
            person_id,
            employment_title: title.to_string(),
            start_date: None,
            end_date: None,
        })
    }

    #[tokio::test]
    async fn test_acquisition_updates_acquired_company() {
        let mut store = MemoryStore::new();
        store.write(&company(1)).await.unwrap();
        store.write(&company(7)).await.unwrap();

        store
            .write(&Record::CompanyAcquisition(CompanyAcquisition {
                parent_company_id: 1,
                acquired_company_id: 7,
                merged_into_parent_company: true,
            }))
            .await
            .unwrap();

        let row = store.company(7).unwrap();
        assert_eq!(row.acquired_by, Some(1));
        assert_eq!(row.merged_into_parent_company, Some(true));
        assert_eq!(store.company(1).unwrap().acquired_by, None);
    }

    #[tokio::test]
    async fn test_acquisition_requires_both_companies() {
        let mut store = MemoryStore::new();
        store.write(&company(1)).await.unwrap();

        let err = store
            .write(&Record::CompanyAcquisition(CompanyAcquisition {
                parent_company_id: 1,
                acquired_company_id: 9,
                merged_into_parent_company: false,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(_)));

        let err = store
            .write(&Record::CompanyAcquisition(CompanyAcquisition {
                parent_company_id: 9,
                acquired_company_id: 1,
                merged_into_parent_company: false,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(_)));
        assert_eq!(store.committed().len(), 1);
    }

    #[tokio::test]
    async fn test_employment_edge_is_a_set() {
        let mut store = MemoryStore::new();
        store.write(&company(1)).await.unwrap();
        store.write(&person(2)).await.unwrap();

        store.write(&employment(1, 2, "Engineer")).await.unwrap();
        store.write(&employment(1, 2, "Staff Engineer")).await.unwrap();

        let edge = store.employment(1, 2).unwrap();
        assert_eq!(edge.employment_title, "Staff Engineer");
    }

    #[tokio::test]
    async fn test_employment_requires_person_and_company() {
        let mut store = MemoryStore::new();
        store.write(&company(1)).await.unwrap();

        let err = store.write(&employment(1, 2, "Engineer")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(_)));

        let err = store.write(&employment(5, 2, "Engineer")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(_)));
        assert!(store.employment(1, 2).is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let observer = MemoryStore::new();
        let mut writer = observer.clone();

        writer.write(&person(3)).await.unwrap();

        assert_eq!(observer.person(3).unwrap().name, "person-3");
        assert_eq!(observer.write_attempts(), 1);
    }
}
