//! Copy pipelines: the concurrent IMAP→IMAP engine and the mbox→IMAP
//! appender, sharing the resume state and the progress-event bus.

pub mod engine;
pub mod events;
pub mod mbox_copy;

pub use engine::MailboxSyncer;
pub use events::{EventKind, SyncEvent};
pub use mbox_copy::MboxCopier;

use std::collections::HashMap;

use chrono::NaiveDate;

/// Run configuration shared by both pipelines.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Perform reads but never APPEND; no state updates.
    pub dry_run: bool,
    /// Only messages with INTERNALDATE on or after this day.
    pub since: Option<NaiveDate>,
    /// Mailboxes processed in parallel; 0 is coerced to 1.
    pub concurrency: usize,
    /// Suppress per-message log output.
    pub quiet: bool,
    /// Read resume state as empty. Writes still happen.
    pub ignore_state: bool,
    /// Exact source→destination mailbox name mapping.
    pub map: HashMap<String, String>,
}

impl SyncOptions {
    /// Destination name for a source mailbox; unmapped names pass through.
    pub fn mapped<'a>(&'a self, name: &'a str) -> &'a str {
        match self.map.get(name) {
            Some(to) if !to.is_empty() => to,
            _ => name,
        }
    }
}
