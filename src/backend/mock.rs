//! In-memory [`MailStore`] for engine tests.
//!
//! A `MockServer` is shared behind a mutex; every `MockConnector::connect`
//! yields an independent `MockStore` session over it, mirroring how real
//! workers each dial their own connection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::{Connect, FetchedMessage, MailStore, MailboxStatus, SearchCriteria};
use crate::error::{FerryError, FerryResult};

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub uid: u32,
    pub internal_date: DateTime<Utc>,
    pub flags: Vec<String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct AppendRecord {
    pub flags: Vec<String>,
    pub date: DateTime<Utc>,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockMailbox {
    messages: Vec<StoredMessage>,
    appends: Vec<AppendRecord>,
}

#[derive(Debug, Default)]
pub struct MockServer {
    mailboxes: HashMap<String, MockMailbox>,
    append_delay: Option<Duration>,
    fail_append: HashSet<String>,
}

impl MockServer {
    pub fn shared() -> Arc<Mutex<MockServer>> {
        Arc::new(Mutex::new(MockServer::default()))
    }

    /// Seed a source message whose body carries its UID in an
    /// `X-Source-UID` header so appends can be traced back.
    pub fn seed_message(&mut self, mailbox: &str, uid: u32, date: &str, flags: &[&str]) {
        let internal_date = date
            .parse::<DateTime<Utc>>()
            .expect("valid RFC 3339 date in test fixture");
        let body = format!("X-Source-UID: {uid}\r\nSubject: test {uid}\r\n\r\nhello\r\n");
        self.mailbox_mut(mailbox).messages.push(StoredMessage {
            uid,
            internal_date,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            body: Some(body.into_bytes()),
        });
    }

    /// Seed a message the server will report without a body literal.
    pub fn seed_bodyless(&mut self, mailbox: &str, uid: u32, date: &str) {
        let internal_date = date
            .parse::<DateTime<Utc>>()
            .expect("valid RFC 3339 date in test fixture");
        self.mailbox_mut(mailbox).messages.push(StoredMessage {
            uid,
            internal_date,
            flags: Vec::new(),
            body: None,
        });
    }

    pub fn set_append_delay(&mut self, delay: Duration) {
        self.append_delay = Some(delay);
    }

    pub fn fail_appends_to(&mut self, mailbox: &str) {
        self.fail_append.insert(mailbox.to_string());
    }

    pub fn has_mailbox(&self, name: &str) -> bool {
        self.mailboxes.contains_key(name)
    }

    pub fn append_count(&self, mailbox: &str) -> usize {
        self.mailboxes
            .get(mailbox)
            .map(|mb| mb.appends.len())
            .unwrap_or(0)
    }

    pub fn appends(&self, mailbox: &str) -> Vec<AppendRecord> {
        self.mailboxes
            .get(mailbox)
            .map(|mb| mb.appends.clone())
            .unwrap_or_default()
    }

    /// Source UIDs of appended messages, recovered from the seeded
    /// `X-Source-UID` header.
    pub fn appended_uids(&self, mailbox: &str) -> Vec<u32> {
        self.appends(mailbox)
            .iter()
            .filter_map(|rec| {
                let text = String::from_utf8_lossy(&rec.body);
                text.lines()
                    .find_map(|l| l.strip_prefix("X-Source-UID: "))
                    .and_then(|v| v.trim().parse().ok())
            })
            .collect()
    }

    fn mailbox_mut(&mut self, name: &str) -> &mut MockMailbox {
        self.mailboxes.entry(name.to_string()).or_default()
    }
}

#[derive(Clone)]
pub struct MockConnector {
    server: Arc<Mutex<MockServer>>,
}

impl MockConnector {
    pub fn new(server: Arc<Mutex<MockServer>>) -> Self {
        MockConnector { server }
    }

    pub fn fresh() -> Self {
        MockConnector::new(MockServer::shared())
    }

    pub fn server(&self) -> &Arc<Mutex<MockServer>> {
        &self.server
    }
}

#[async_trait]
impl Connect for MockConnector {
    type Store = MockStore;

    async fn connect(&self) -> FerryResult<Self::Store> {
        Ok(MockStore {
            server: self.server.clone(),
            selected: None,
        })
    }
}

pub struct MockStore {
    server: Arc<Mutex<MockServer>>,
    selected: Option<String>,
}

impl MockStore {
    fn selected(&self) -> FerryResult<String> {
        self.selected
            .clone()
            .ok_or_else(|| FerryError::Imap("no mailbox selected".into()))
    }
}

#[async_trait]
impl MailStore for MockStore {
    async fn list_mailboxes(&mut self) -> FerryResult<Vec<String>> {
        let server = self.server.lock().unwrap();
        let mut names: Vec<String> = server.mailboxes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn select(&mut self, mailbox: &str, _read_only: bool) -> FerryResult<MailboxStatus> {
        let server = self.server.lock().unwrap();
        let mb = server
            .mailboxes
            .get(mailbox)
            .ok_or_else(|| FerryError::Imap(format!("SELECT failed: no mailbox {}", mailbox)))?;
        self.selected = Some(mailbox.to_string());
        Ok(MailboxStatus {
            exists: mb.messages.len() as u32,
            uid_validity: Some(1),
        })
    }

    async fn uid_search(&mut self, criteria: &SearchCriteria) -> FerryResult<Vec<u32>> {
        let selected = self.selected()?;
        let server = self.server.lock().unwrap();
        let mb = server
            .mailboxes
            .get(&selected)
            .ok_or_else(|| FerryError::Imap("selected mailbox vanished".into()))?;
        let mut uids: Vec<u32> = mb
            .messages
            .iter()
            .filter(|m| m.uid > criteria.min_uid)
            .filter(|m| match criteria.since {
                Some(since) => m.internal_date.date_naive() >= since,
                None => true,
            })
            .filter(|m| !criteria.unseen || !m.flags.iter().any(|f| f == "\\Seen"))
            .map(|m| m.uid)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_into(
        &mut self,
        uids: &[u32],
        tx: mpsc::Sender<FetchedMessage>,
    ) -> FerryResult<()> {
        let selected = self.selected()?;
        let wanted: HashSet<u32> = uids.iter().copied().collect();
        let messages: Vec<StoredMessage> = {
            let server = self.server.lock().unwrap();
            let mb = server
                .mailboxes
                .get(&selected)
                .ok_or_else(|| FerryError::Imap("selected mailbox vanished".into()))?;
            let mut found: Vec<StoredMessage> = mb
                .messages
                .iter()
                .filter(|m| wanted.contains(&m.uid))
                .cloned()
                .collect();
            found.sort_by_key(|m| m.uid);
            found
        };
        for msg in messages {
            let fetched = FetchedMessage {
                uid: msg.uid,
                internal_date: Some(msg.internal_date),
                flags: msg.flags,
                body: msg.body,
            };
            if tx.send(fetched).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn append(
        &mut self,
        mailbox: &str,
        flags: &[String],
        date: DateTime<Utc>,
        body: &[u8],
    ) -> FerryResult<()> {
        let delay = {
            let server = self.server.lock().unwrap();
            if server.fail_append.contains(mailbox) {
                return Err(FerryError::Imap(format!("APPEND failed: {} refused", mailbox)));
            }
            server.append_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut server = self.server.lock().unwrap();
        server.mailbox_mut(mailbox).appends.push(AppendRecord {
            flags: flags.to_vec(),
            date,
            body: body.to_vec(),
        });
        Ok(())
    }

    async fn create(&mut self, mailbox: &str) -> FerryResult<()> {
        let mut server = self.server.lock().unwrap();
        server.mailbox_mut(mailbox);
        Ok(())
    }

    async fn store_flag(&mut self, uids: &[u32], flag: &str) -> FerryResult<()> {
        let selected = self.selected()?;
        let wanted: HashSet<u32> = uids.iter().copied().collect();
        let mut server = self.server.lock().unwrap();
        let mb = server.mailbox_mut(&selected);
        for msg in mb.messages.iter_mut() {
            if wanted.contains(&msg.uid) && !msg.flags.iter().any(|f| f == flag) {
                msg.flags.push(flag.to_string());
            }
        }
        Ok(())
    }

    async fn expunge(&mut self) -> FerryResult<()> {
        let selected = self.selected()?;
        let mut server = self.server.lock().unwrap();
        let mb = server.mailbox_mut(&selected);
        mb.messages.retain(|m| !m.flags.iter().any(|f| f == "\\Deleted"));
        Ok(())
    }

    async fn logout(&mut self) -> FerryResult<()> {
        Ok(())
    }
}
