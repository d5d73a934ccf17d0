//! Input sources for the ingest loop.
//!
//! A [`LineSource`] hands out a fresh buffered reader each time it is opened.
//! The loop reopens the source whenever the current reader reaches
//! end-of-stream, which for a named pipe happens every time the writer
//! detaches.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncRead, BufReader};
use tracing::debug;

use crate::{Error, Result};

/// A buffered reader that can tell whether unread bytes are already held in
/// its buffer.
pub trait LineReader: AsyncBufRead + Unpin + Send {
    fn has_buffered_data(&self) -> bool;
}

impl<R: AsyncRead + Unpin + Send> LineReader for BufReader<R> {
    fn has_buffered_data(&self) -> bool {
        !self.buffer().is_empty()
    }
}

#[async_trait]
pub trait LineSource: Send {
    type Reader: LineReader;

    /// Opens the source for reading. May block until a writer attaches.
    async fn open(&mut self) -> Result<Self::Reader>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// A named pipe, device or regular file reopened at the same path.
#[derive(Debug, Clone)]
pub struct PipeSource {
    path: PathBuf,
}

impl PipeSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LineSource for PipeSource {
    type Reader = BufReader<File>;

    async fn open(&mut self) -> Result<Self::Reader> {
        debug!(path = ?self.path, "Opening input source");
        let file = File::open(&self.path).await.map_err(|source| Error::Source {
            path: self.path.clone(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
