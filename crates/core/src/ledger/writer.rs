use std::sync::Arc;

use tokio::sync::mpsc;

use super::{LedgerEntry, LedgerHandle, LedgerStore};

/// Background task appending queued entries to the ledger store.
pub struct LedgerWriter {
    rx: mpsc::Receiver<LedgerEntry>,
    store: Arc<dyn LedgerStore>,
}

impl LedgerWriter {
    pub fn new(rx: mpsc::Receiver<LedgerEntry>, store: Arc<dyn LedgerStore>) -> Self {
        Self { rx, store }
    }

    /// Write entries until every handle is dropped. Returns the number of
    /// lines written.
    ///
    /// Appends run on the blocking pool, one at a time in arrival order.
    pub async fn run(mut self) -> usize {
        tracing::debug!(path = %self.store.location().display(), "Skip ledger writer started");
        let mut written = 0;

        while let Some(entry) = self.rx.recv().await {
            let store = Arc::clone(&self.store);
            let task = tokio::task::spawn_blocking(move || {
                let result = store.append(&entry);
                (entry, result)
            });
            match task.await {
                Ok((_, Ok(()))) => written += 1,
                Ok((entry, Err(e))) => tracing::error!(
                    ticket = %entry.ticket_number,
                    reason = %entry.reason,
                    "Failed to write skip ledger entry: {}",
                    e
                ),
                Err(e) => tracing::error!("Skip ledger append task failed: {}", e),
            }
        }

        tracing::debug!(written, "Skip ledger writer finished");
        written
    }
}

/// Create the ledger handle and its writer.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; it finishes once
/// every clone of the handle is dropped.
pub fn create_ledger(store: Arc<dyn LedgerStore>, buffer_size: usize) -> (LedgerHandle, LedgerWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (LedgerHandle::new(tx), LedgerWriter::new(rx, store))
}
