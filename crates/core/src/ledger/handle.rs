use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// A ticket that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    /// Public ticket number.
    pub ticket_number: String,
    pub reason: String,
}

impl LedgerEntry {
    pub fn new(ticket_number: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            ticket_number: ticket_number.into(),
            reason: reason.into(),
        }
    }
}

/// Handle for recording skipped tickets.
///
/// Cheaply cloneable; entries are written by the [`LedgerWriter`](super::LedgerWriter).
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerEntry>,
}

impl LedgerHandle {
    pub fn new(tx: mpsc::Sender<LedgerEntry>) -> Self {
        Self { tx }
    }

    /// Queue an entry. A closed channel is logged, never returned.
    pub async fn record(&self, entry: LedgerEntry) {
        let number = entry.ticket_number.clone();
        if let Err(e) = self.tx.send(entry).await {
            tracing::error!(ticket = %number, "Failed to record skipped ticket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_entry() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = LedgerHandle::new(tx);

        handle.record(LedgerEntry::new("100", "No messages")).await;

        let entry = rx.recv().await.expect("Should receive entry");
        assert_eq!(entry.ticket_number, "100");
        assert_eq!(entry.reason, "No messages");
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let (tx, mut rx) = mpsc::channel(10);
        let a = LedgerHandle::new(tx);
        let b = a.clone();

        a.record(LedgerEntry::new("1", "x")).await;
        b.record(LedgerEntry::new("2", "y")).await;

        assert_eq!(rx.recv().await.unwrap().ticket_number, "1");
        assert_eq!(rx.recv().await.unwrap().ticket_number, "2");
    }

    #[tokio::test]
    async fn test_record_on_closed_channel() {
        let (tx, rx) = mpsc::channel::<LedgerEntry>(10);
        let handle = LedgerHandle::new(tx);
        drop(rx);

        // Logged, not panicking.
        handle.record(LedgerEntry::new("1", "x")).await;
    }
}
