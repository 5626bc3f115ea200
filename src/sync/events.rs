//! Progress events emitted by the copy pipelines.
//!
//! Production is lossy: events are pushed with `try_send` into a bounded
//! channel and silently dropped when the consumer lags. `done` and `total`
//! are absolute values, so any dropped event is corrected by the next one.
//! The channel disconnects exactly once, when the run that owns the sender
//! finishes.

/// Buffer size of the event channel.
pub const EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MailboxStart,
    MailboxProgress,
    MailboxDone,
}

#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub kind: EventKind,
    pub mailbox: String,
    pub total: usize,
    pub done: usize,
}

impl SyncEvent {
    pub fn start(mailbox: &str) -> Self {
        SyncEvent {
            kind: EventKind::MailboxStart,
            mailbox: mailbox.to_string(),
            total: 0,
            done: 0,
        }
    }

    pub fn progress(mailbox: &str, total: usize, done: usize) -> Self {
        SyncEvent {
            kind: EventKind::MailboxProgress,
            mailbox: mailbox.to_string(),
            total,
            done,
        }
    }

    pub fn done(mailbox: &str) -> Self {
        SyncEvent {
            kind: EventKind::MailboxDone,
            mailbox: mailbox.to_string(),
            total: 0,
            done: 0,
        }
    }
}
