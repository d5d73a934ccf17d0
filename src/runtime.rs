//! Runtime ownership for the service binary.
//!
//! Opening or reading a named pipe through `tokio::fs` runs on the blocking
//! pool and keeps running after its future is dropped. Dropping a runtime
//! waits on those tasks without a bound, so [`block_on`] tears the runtime
//! down with a bounded wait instead.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::Result;

/// Runs `future` on a fresh multi-threaded runtime, then shuts the runtime
/// down, waiting at most `grace` for blocking work still in flight.
pub fn block_on<F: Future>(grace: Duration, future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("entity-ingest")
        .build()?;

    let output = runtime.block_on(future);

    debug!(grace = ?grace, "Shutting down runtime");
    runtime.shutdown_timeout(grace);
    Ok(output)
}
