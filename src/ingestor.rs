//! The long-running ingest loop.
//!
//! [`Ingestor::run`] owns the input source and moves between three states:
//! closed (nothing open), open (a reader is attached) and reading (a line is
//! being processed). End-of-stream returns the loop to closed and the source
//! is opened again at the same location. Each line goes through decode,
//! schema lookup, validation and storage; a failure at any of those steps is
//! logged and the line dropped without affecting the next one.
//!
//! Lines are applied strictly one at a time in arrival order. Shutdown is
//! only observed while waiting on the source, so a record that has started
//! applying always finishes first.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::message::{trim_line, DecodeError, Envelope};
use crate::schema::{self, Record, ValidationError};
use crate::source::{LineReader, LineSource};
use crate::store::{Applied, RecordStore, StorageAdapter, StoreError};
use crate::{Error, Result};

/// Why a single line was dropped.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no schema exists for message type {0:?}")]
    UnknownType(String),

    #[error("{source}")]
    Validation {
        source: ValidationError,
        payload: Value,
    },

    #[error("{source}")]
    Store { source: StoreError, record: Record },
}

/// Counters kept over the life of one [`Ingestor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub applied: u64,
    pub decode_errors: u64,
    pub unknown_types: u64,
    pub validation_errors: u64,
    pub store_errors: u64,
    /// Times the source was opened, including the first.
    pub connections: u64,
    /// Times the source was reopened after end-of-stream.
    pub reconnects: u64,
}

impl IngestStats {
    pub fn failed(&self) -> u64 {
        self.decode_errors + self.unknown_types + self.validation_errors + self.store_errors
    }

    fn record_failure(&mut self, err: &IngestError) {
        match err {
            IngestError::Decode(_) => self.decode_errors += 1,
            IngestError::UnknownType(_) => self.unknown_types += 1,
            IngestError::Validation { .. } => self.validation_errors += 1,
            IngestError::Store { .. } => self.store_errors += 1,
        }
    }
}

enum ReadOutcome {
    EndOfStream,
    Shutdown,
}

pub struct Ingestor<L, S> {
    source: L,
    adapter: StorageAdapter<S>,
    reopen_on_eof: bool,
    stats: IngestStats,
}

impl<L: LineSource, S: RecordStore> Ingestor<L, S> {
    pub fn new(source: L, adapter: StorageAdapter<S>, config: &SourceConfig) -> Self {
        Self {
            source,
            adapter,
            reopen_on_eof: config.reopen_on_eof,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn adapter(&self) -> &StorageAdapter<S> {
        &self.adapter
    }

    /// Reads and applies lines until `shutdown` resolves, or until
    /// end-of-stream when reopening is disabled.
    ///
    /// Only a failure to open the source ends the loop with an error.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<IngestStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut line = Vec::with_capacity(4096);

        loop {
            let mut reader = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                opened = self.source.open() => opened?,
            };
            self.stats.connections += 1;
            info!(source = %self.source.describe(), "Input source attached");

            let outcome = loop {
                line.clear();
                debug!("Awaiting message...");

                let read = tokio::select! {
                    biased;
                    _ = &mut shutdown => break ReadOutcome::Shutdown,
                    read = reader.read_until(b'\n', &mut line) => read,
                };

                match read {
                    Ok(0) => break ReadOutcome::EndOfStream,
                    // A blank line marks end-of-stream only once nothing else is buffered.
                    Ok(_) if trim_line(&line).is_empty() => {
                        if !reader.has_buffered_data() {
                            break ReadOutcome::EndOfStream;
                        }
                        debug!("Skipping blank line followed by buffered data");
                    }
                    Ok(_) => self.handle_line(&line).await,
                    Err(e) => {
                        error!(error = %e, "Error while reading from input source");
                        break ReadOutcome::EndOfStream;
                    }
                }
            };
            drop(reader);

            match outcome {
                ReadOutcome::Shutdown => break,
                ReadOutcome::EndOfStream if !self.reopen_on_eof => {
                    info!("End of stream, not reopening input source");
                    break;
                }
                ReadOutcome::EndOfStream => {
                    self.stats.reconnects += 1;
                    warn!(source = %self.source.describe(), "End of stream, reopening input source");
                }
            }
        }

        info!(stats = ?self.stats, "Ingest loop stopped");
        Ok(self.stats.clone())
    }

    /// Decodes, validates and applies one line.
    pub async fn process_line(&mut self, line: &[u8]) -> std::result::Result<Applied, IngestError> {
        let envelope = Envelope::decode(line)?;

        let schema = schema::lookup(&envelope.type_tag)
            .ok_or_else(|| IngestError::UnknownType(envelope.type_tag.clone()))?;

        let record = schema::validate(schema, &envelope.data).map_err(|source| {
            IngestError::Validation {
                source,
                payload: Value::Object(envelope.data.clone()),
            }
        })?;

        match self.adapter.apply(&record).await {
            Ok(applied) => {
                debug!(record = ?record, attempts = applied.attempts, "Updated database with record");
                Ok(applied)
            }
            Err(source) => Err(IngestError::Store { source, record }),
        }
    }

    async fn handle_line(&mut self, line: &[u8]) {
        self.stats.lines += 1;
        debug!(message = %String::from_utf8_lossy(line).trim_end(), "Received message");

        let err = match self.process_line(line).await {
            Ok(_) => {
                self.stats.applied += 1;
                return;
            }
            Err(err) => err,
        };

        self.stats.record_failure(&err);
        match &err {
            IngestError::Decode(e) => {
                error!(error = %e, "Error decoding message");
            }
            IngestError::UnknownType(tag) => {
                error!(message_type = %tag, "No schema exists for message type");
            }
            IngestError::Validation { source, payload } => {
                error!(
                    kind = %source.kind,
                    error = %source,
                    payload = %payload,
                    "Error validating message"
                );
            }
            IngestError::Store { source, record } => {
                error!(
                    kind = %record.kind(),
                    error = %source,
                    record = ?record,
                    "Error inserting record"
                );
            }
        }
    }

    /// Releases the storage connection, waiting at most `grace`.
    pub async fn close(mut self, grace: Duration) -> Result<()> {
        match tokio::time::timeout(grace, self.adapter.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Connection(e.to_string())),
            Err(_) => Err(Error::Timeout {
                message: format!("closing storage connection took longer than {:?}", grace),
            }),
        }
    }
}
