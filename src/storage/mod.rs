//! Durable local storage for alert records.

mod journal;

pub use journal::{retention_cutoff, AlertJournal, JournalError};
