pub mod config;
pub mod error;
pub mod ingestor;
pub mod message;
pub mod runtime;
pub mod schema;
pub mod source;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use ingestor::{IngestError, IngestStats, Ingestor};
