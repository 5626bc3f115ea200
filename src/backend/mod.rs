//! Mail store abstraction.
//!
//! The sync engine and the management commands talk to a [`MailStore`]
//! rather than to `async-imap` directly, so the engine can be exercised
//! against an in-memory store. [`Connect`] is the dialing side: each
//! mailbox worker opens its own source/destination pair, which keeps the
//! SELECT-then-APPEND protocol state private to one worker.

pub mod imap;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::mpsc;

use crate::error::FerryResult;

/// Status returned by selecting a mailbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailboxStatus {
    pub exists: u32,
    pub uid_validity: Option<u32>,
}

/// UID SEARCH restriction. Empty criteria match every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchCriteria {
    /// Only messages with INTERNALDATE on or after this day.
    pub since: Option<NaiveDate>,
    /// Only UIDs strictly greater than this value.
    pub min_uid: u32,
    /// Only messages without \Seen.
    pub unseen: bool,
}

impl SearchCriteria {
    pub fn is_empty(&self) -> bool {
        self.since.is_none() && self.min_uid == 0 && !self.unseen
    }
}

/// One fetched message as the copy pipeline sees it. The body is fully
/// materialized before the next message is delivered.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub internal_date: Option<DateTime<Utc>>,
    pub flags: Vec<String>,
    pub body: Option<Vec<u8>>,
}

#[async_trait]
pub trait MailStore: Send {
    async fn list_mailboxes(&mut self) -> FerryResult<Vec<String>>;

    async fn select(&mut self, mailbox: &str, read_only: bool) -> FerryResult<MailboxStatus>;

    /// UIDs matching the criteria, ascending.
    async fn uid_search(&mut self, criteria: &SearchCriteria) -> FerryResult<Vec<u32>>;

    /// Stream the given UIDs of the selected mailbox into `tx`, in server
    /// delivery order. Returns when every message has been sent, the
    /// receiver goes away, or the fetch fails.
    async fn fetch_into(
        &mut self,
        uids: &[u32],
        tx: mpsc::Sender<FetchedMessage>,
    ) -> FerryResult<()>;

    async fn append(
        &mut self,
        mailbox: &str,
        flags: &[String],
        date: DateTime<Utc>,
        body: &[u8],
    ) -> FerryResult<()>;

    async fn create(&mut self, mailbox: &str) -> FerryResult<()>;

    /// Add `flag` to every UID in `uids` within the selected mailbox.
    async fn store_flag(&mut self, uids: &[u32], flag: &str) -> FerryResult<()>;

    /// Permanently remove \Deleted messages from the selected mailbox.
    async fn expunge(&mut self) -> FerryResult<()>;

    /// Best-effort, idempotent.
    async fn logout(&mut self) -> FerryResult<()>;

    /// Make sure `mailbox` exists and is selectable read-write: select it,
    /// and when that fails create it and select again, returning the first
    /// enduring error.
    async fn ensure_mailbox(&mut self, mailbox: &str) -> FerryResult<()> {
        if self.select(mailbox, false).await.is_ok() {
            return Ok(());
        }
        if let Err(create_err) = self.create(mailbox).await {
            // Racing creators are fine as long as the mailbox is there now.
            return match self.select(mailbox, false).await {
                Ok(_) => Ok(()),
                Err(_) => Err(create_err),
            };
        }
        self.select(mailbox, false).await.map(|_| ())
    }
}

#[async_trait]
pub trait Connect: Send + Sync {
    type Store: MailStore + 'static;

    async fn connect(&self) -> FerryResult<Self::Store>;
}
