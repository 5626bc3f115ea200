//! async-imap backed [`MailStore`].

use async_imap::types::Flag;
use async_imap::Session;
use async_native_tls::TlsStream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Connect, FetchedMessage, MailStore, MailboxStatus, SearchCriteria};
use crate::error::{FerryError, FerryResult};

// An IMAP session is generic over the stream type; ours is TLS-encrypted
// TCP, for both implicit TLS and STARTTLS.
pub type ImapSession = Session<TlsStream<TcpStream>>;

/// Environment flag that turns on command-level wire tracing (stderr).
pub const TRACE_ENV: &str = "MAILFERRY_IMAP_TRACE";

const FETCH_ITEMS: &str = "(UID INTERNALDATE FLAGS BODY[])";
const FETCH_CHUNK: usize = 500;
const STORE_CHUNK: usize = 500;

/// Where and how to reach one IMAP account. Cloned into every mailbox
/// worker, which dials its own connection pair.
#[derive(Debug, Clone)]
pub struct ImapEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Upgrade a plain connection with STARTTLS instead of implicit TLS.
    pub starttls: bool,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

impl ImapEndpoint {
    pub async fn connect(&self) -> FerryResult<ImapStore> {
        info!(host = %self.host, port = self.port, starttls = self.starttls, "connecting to IMAP server");

        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| FerryError::Connect(format!("TCP connection failed: {}", e)))?;

        let tls = async_native_tls::TlsConnector::new()
            .danger_accept_invalid_certs(self.insecure)
            .danger_accept_invalid_hostnames(self.insecure);

        let tls_stream = if self.starttls {
            let tcp = negotiate_starttls(tcp).await?;
            tls.connect(&self.host, tcp)
                .await
                .map_err(|e| FerryError::Connect(format!("TLS handshake failed: {}", e)))?
        } else {
            tls.connect(&self.host, tcp)
                .await
                .map_err(|e| FerryError::Connect(format!("TLS handshake failed: {}", e)))?
        };

        let client = async_imap::Client::new(tls_stream);
        let session = client
            .login(&self.user, &self.password)
            .await
            .map_err(|(e, _)| FerryError::Auth(format!("login failed: {}", e)))?;

        Ok(ImapStore {
            session,
            trace: std::env::var(TRACE_ENV).map(|v| v == "1").unwrap_or(false),
        })
    }
}

#[async_trait]
impl Connect for ImapEndpoint {
    type Store = ImapStore;

    async fn connect(&self) -> FerryResult<Self::Store> {
        ImapEndpoint::connect(self).await
    }
}

/// Read the server greeting and upgrade the plain socket with STARTTLS.
/// This happens on the raw TCP stream, before the IMAP client is built on
/// top of the encrypted one.
async fn negotiate_starttls(mut tcp: TcpStream) -> FerryResult<TcpStream> {
    let greeting = read_crlf_line(&mut tcp).await?;
    if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
        return Err(FerryError::Connect(format!(
            "unexpected IMAP greeting: {}",
            greeting.trim_end()
        )));
    }

    tcp.write_all(b"a0 STARTTLS\r\n")
        .await
        .map_err(|e| FerryError::Connect(format!("STARTTLS write failed: {}", e)))?;

    loop {
        let line = read_crlf_line(&mut tcp).await?;
        if line.starts_with("* ") {
            continue;
        }
        if line.starts_with("a0 OK") {
            return Ok(tcp);
        }
        return Err(FerryError::Connect(format!(
            "STARTTLS refused: {}",
            line.trim_end()
        )));
    }
}

// Byte-at-a-time so nothing past the line is consumed; the TLS handshake
// bytes follow immediately.
async fn read_crlf_line(tcp: &mut TcpStream) -> FerryResult<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = tcp
            .read(&mut byte)
            .await
            .map_err(|e| FerryError::Connect(format!("read failed: {}", e)))?;
        if n == 0 {
            return Err(FerryError::Connect(
                "connection closed during STARTTLS negotiation".into(),
            ));
        }
        line.push(byte[0]);
        if byte[0] == b'\n' {
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

pub struct ImapStore {
    session: ImapSession,
    trace: bool,
}

impl ImapStore {
    fn wire(&self, command: &str) {
        if self.trace {
            eprintln!("C: {}", command);
        }
    }
}

fn flag_token(flag: &Flag<'_>) -> Option<String> {
    match flag {
        Flag::Seen => Some("\\Seen".into()),
        Flag::Answered => Some("\\Answered".into()),
        Flag::Flagged => Some("\\Flagged".into()),
        Flag::Deleted => Some("\\Deleted".into()),
        Flag::Draft => Some("\\Draft".into()),
        // \Recent is server-assigned and may not be set by APPEND.
        Flag::Recent => None,
        Flag::MayCreate => None,
        Flag::Custom(s) => Some(s.to_string()),
    }
}

fn search_query(criteria: &SearchCriteria) -> String {
    let mut parts = Vec::new();
    if criteria.min_uid > 0 {
        parts.push(format!("UID {}:*", criteria.min_uid.saturating_add(1)));
    }
    if let Some(since) = criteria.since {
        parts.push(format!("SINCE {}", since.format("%d-%b-%Y")));
    }
    if criteria.unseen {
        parts.push("UNSEEN".to_string());
    }
    if parts.is_empty() {
        "ALL".to_string()
    } else {
        parts.join(" ")
    }
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl MailStore for ImapStore {
    async fn list_mailboxes(&mut self) -> FerryResult<Vec<String>> {
        self.wire("LIST \"\" \"*\"");
        let stream = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| FerryError::Imap(format!("LIST failed: {}", e)))?;
        futures::pin_mut!(stream);

        let mut names = Vec::new();
        let mut has_inbox = false;
        while let Some(item) = stream.next().await {
            let name = item
                .map_err(|e| FerryError::Imap(format!("LIST failed: {}", e)))?;
            let name = name.name().to_string();
            if name.eq_ignore_ascii_case("INBOX") {
                has_inbox = true;
            }
            names.push(name);
        }
        // Every IMAP server should expose INBOX; cover the ones that omit
        // it from LIST anyway.
        if !has_inbox {
            names.push("INBOX".to_string());
        }
        debug!(count = names.len(), "listed mailboxes");
        Ok(names)
    }

    async fn select(&mut self, mailbox: &str, read_only: bool) -> FerryResult<MailboxStatus> {
        self.wire(&format!(
            "{} {}",
            if read_only { "EXAMINE" } else { "SELECT" },
            mailbox
        ));
        let mb = if read_only {
            self.session.examine(mailbox).await
        } else {
            self.session.select(mailbox).await
        }
        .map_err(|e| FerryError::Imap(format!("SELECT failed: {}", e)))?;

        Ok(MailboxStatus {
            exists: mb.exists,
            uid_validity: mb.uid_validity,
        })
    }

    async fn uid_search(&mut self, criteria: &SearchCriteria) -> FerryResult<Vec<u32>> {
        let query = search_query(criteria);
        self.wire(&format!("UID SEARCH {}", query));
        let set = self
            .session
            .uid_search(&query)
            .await
            .map_err(|e| FerryError::Imap(format!("SEARCH failed: {}", e)))?;
        let mut uids: Vec<u32> = set.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_into(
        &mut self,
        uids: &[u32],
        tx: mpsc::Sender<FetchedMessage>,
    ) -> FerryResult<()> {
        for chunk in uids.chunks(FETCH_CHUNK) {
            let set = uid_set(chunk);
            self.wire(&format!("UID FETCH {} {}", set, FETCH_ITEMS));
            let stream = self
                .session
                .uid_fetch(&set, FETCH_ITEMS)
                .await
                .map_err(|e| FerryError::Imap(format!("FETCH failed: {}", e)))?;
            futures::pin_mut!(stream);

            while let Some(item) = stream.next().await {
                let fetch =
                    item.map_err(|e| FerryError::Imap(format!("FETCH failed: {}", e)))?;
                let Some(uid) = fetch.uid else {
                    warn!("FETCH response without UID, skipped");
                    continue;
                };
                let msg = FetchedMessage {
                    uid,
                    internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                    flags: fetch.flags().filter_map(|f| flag_token(&f)).collect(),
                    body: fetch.body().map(|b| b.to_vec()),
                };
                if tx.send(msg).await.is_err() {
                    // Receiver is gone; the worker stopped consuming.
                    return Ok(());
                }
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
        let flag_list = if flags.is_empty() {
            None
        } else {
            Some(format!("({})", flags.join(" ")))
        };
        let internal_date = date.format("%d-%b-%Y %H:%M:%S %z").to_string();
        self.wire(&format!(
            "APPEND {} {} \"{}\" {{{}}}",
            mailbox,
            flag_list.as_deref().unwrap_or("()"),
            internal_date,
            body.len()
        ));
        self.session
            .append(mailbox, flag_list.as_deref(), Some(&internal_date), body)
            .await
            .map_err(|e| FerryError::Imap(format!("APPEND failed: {}", e)))
    }

    async fn create(&mut self, mailbox: &str) -> FerryResult<()> {
        self.wire(&format!("CREATE {}", mailbox));
        self.session
            .create(mailbox)
            .await
            .map_err(|e| FerryError::Imap(format!("CREATE failed: {}", e)))
    }

    async fn store_flag(&mut self, uids: &[u32], flag: &str) -> FerryResult<()> {
        for chunk in uids.chunks(STORE_CHUNK) {
            let set = uid_set(chunk);
            let query = format!("+FLAGS ({})", flag);
            self.wire(&format!("UID STORE {} {}", set, query));
            let stream = self
                .session
                .uid_store(&set, &query)
                .await
                .map_err(|e| FerryError::Imap(format!("STORE failed: {}", e)))?;
            futures::pin_mut!(stream);
            while let Some(item) = stream.next().await {
                item.map_err(|e| FerryError::Imap(format!("STORE failed: {}", e)))?;
            }
        }
        Ok(())
    }

    async fn expunge(&mut self) -> FerryResult<()> {
        self.wire("EXPUNGE");
        let stream = self
            .session
            .expunge()
            .await
            .map_err(|e| FerryError::Imap(format!("EXPUNGE failed: {}", e)))?;
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            item.map_err(|e| FerryError::Imap(format!("EXPUNGE failed: {}", e)))?;
        }
        Ok(())
    }

    async fn logout(&mut self) -> FerryResult<()> {
        self.wire("LOGOUT");
        if let Err(e) = self.session.logout().await {
            debug!("logout: {}", e);
        }
        Ok(())
    }
}
