use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::LedgerEntry;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to open ledger {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to append to ledger {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

/// Destination for skipped-ticket entries.
pub trait LedgerStore: Send + Sync {
    /// Append one entry as one complete line.
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Where entries end up, for the run summary.
    fn location(&self) -> &Path;
}

/// `skipped_tickets_<YYYYmmdd_HHMMSS>.txt`
pub fn ledger_file_name(started_at: DateTime<Utc>) -> String {
    format!("skipped_tickets_{}.txt", started_at.format("%Y%m%d_%H%M%S"))
}

/// `<number>\t<reason>\n`, with tabs and line breaks in either part
/// replaced by spaces.
pub fn format_line(entry: &LedgerEntry) -> String {
    format!(
        "{}\t{}\n",
        single_line(&entry.ticket_number),
        single_line(&entry.reason)
    )
}

fn single_line(text: &str) -> String {
    text.replace(['\t', '\r', '\n'], " ")
}

/// Append-only text file ledger.
pub struct FileLedgerStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLedgerStore {
    /// Open (creating if needed) a ledger file in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::Open {
                path: path.clone(),
                source: e,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open a timestamped ledger file inside `dir`.
    pub fn in_dir(dir: &Path, started_at: DateTime<Utc>) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(dir).map_err(|e| LedgerError::Open {
            path: dir.to_path_buf(),
            source: e,
        })?;
        Self::open(dir.join(ledger_file_name(started_at)))
    }
}

impl LedgerStore for FileLedgerStore {
    fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let line = format_line(entry);
        let mut file = self.file.lock().map_err(|_| LedgerError::LockPoisoned)?;
        file.write_all(line.as_bytes())
            .map_err(|e| LedgerError::Append {
                path: self.path.clone(),
                source: e,
            })?;
        file.flush().map_err(|e| LedgerError::Append {
            path: self.path.clone(),
            source: e,
        })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
