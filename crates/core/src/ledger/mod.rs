//! Skip ledger: an append-only record of tickets that could not be migrated.
//!
//! Workers record entries through a cloneable [`LedgerHandle`]; a single
//! [`LedgerWriter`] task appends one complete `<number>\t<reason>` line per
//! entry, so concurrent failures never interleave within a line.

mod handle;
mod store;
mod writer;

pub use handle::{LedgerEntry, LedgerHandle};
pub use store::{format_line, ledger_file_name, FileLedgerStore, LedgerError, LedgerStore};
pub use writer::{create_ledger, LedgerWriter};
