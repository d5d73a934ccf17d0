//! Error types and result handling for entity-ingest.
//!
//! This module defines the crate-level error type [`Error`] and a convenience
//! [`Result`] type alias. These errors cover resource acquisition and setup:
//! configuration, the input source and the storage connection. Failures of a
//! single message never surface here; they are reported through
//! [`IngestError`](crate::ingestor::IngestError) and logged by the ingest loop.
//!
//! # Example
//!
//! ```rust
//! use entity_ingest::{Error, Result};
//!
//! fn connect_to_database() -> Result<()> {
//!     // Simulating a connection error
//!     Err(Error::Connection("Failed to connect".to_string()))
//! }
//!
//! match connect_to_database() {
//!     Ok(()) => println!("Connected"),
//!     Err(Error::Connection(msg)) => eprintln!("Connection error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for entity-ingest operations.
///
/// Any of these terminates the process; everything recoverable is handled
/// inside the ingest loop.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but holds values that cannot work.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// PostgreSQL client or protocol error during setup.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// I/O error not tied to the input source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input source could not be opened.
    #[error("Failed to open input source {path:?}: {source}")]
    Source {
        /// Location of the source that failed to open
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation timeout.
    #[error("Timeout error: {message}")]
    Timeout {
        /// Description of what timed out
        message: String,
    },
}

/// A convenient Result type alias for entity-ingest operations.
///
/// This is equivalent to `std::result::Result<T, entity_ingest::Error>`.
///
/// # Example
///
/// ```rust
/// use entity_ingest::Result;
///
/// fn do_something() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
