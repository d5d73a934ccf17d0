//! Storage adapter for validated records.
//!
//! A [`RecordStore`] performs exactly one transactional write attempt per
//! call. Retrying transient failures is the job of [`StorageAdapter`], which
//! wraps any store with a [`RetryPolicy`].

pub mod memory;
pub mod postgres;
pub mod retry;
pub mod statements;

use async_trait::async_trait;
use thiserror::Error;

use crate::schema::Record;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use retry::{Applied, RetryPolicy, StorageAdapter};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Expected to succeed if the same write is attempted again.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// The record's key already exists.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// The record points at an entity the store does not hold.
    #[error("missing referenced entity: {0}")]
    MissingReference(String),

    /// Any other constraint or statement failure.
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<StoreError>,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// One transactional write per call. Implementations must leave the store
/// unchanged when they return an error.
#[async_trait]
pub trait RecordStore: Send {
    async fn write(&mut self, record: &Record) -> Result<(), StoreError>;

    /// Releases the underlying connection.
    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
