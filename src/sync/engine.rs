//! Concurrent, resumable IMAP→IMAP copy engine.
//!
//! One worker per mailbox, bounded by a semaphore. Each worker dials its
//! own source/destination connection pair, so the SELECT-then-APPEND
//! protocol state never crosses workers. Fetching runs on a separate task
//! that owns the source store and feeds a bounded channel; the worker
//! consumes it, appends, and checkpoints the high-water UID after every
//! successful APPEND.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::events::{SyncEvent, EVENT_BUFFER};
use super::SyncOptions;
use crate::backend::{Connect, MailStore, SearchCriteria};
use crate::error::{FerryError, FerryResult};
use crate::state::SyncState;

/// Bound on in-flight fetched messages per mailbox.
const MESSAGE_BUFFER: usize = 64;

pub struct MailboxSyncer<S: Connect, D: Connect> {
    src: S,
    dst: D,
    state: Arc<SyncState>,
    opts: SyncOptions,
    events_tx: flume::Sender<SyncEvent>,
    events_rx: flume::Receiver<SyncEvent>,
}

impl<S, D> MailboxSyncer<S, D>
where
    S: Connect + 'static,
    D: Connect + 'static,
{
    pub fn new(src: S, dst: D, state: Arc<SyncState>, mut opts: SyncOptions) -> Self {
        if opts.concurrency == 0 {
            opts.concurrency = 1;
        }
        let (events_tx, events_rx) = flume::bounded(EVENT_BUFFER);
        MailboxSyncer {
            src,
            dst,
            state,
            opts,
            events_tx,
            events_rx,
        }
    }

    /// Progress event stream. Disconnects when the run returns.
    pub fn events(&self) -> flume::Receiver<SyncEvent> {
        self.events_rx.clone()
    }

    fn emit(&self, event: SyncEvent) {
        // Lossy on purpose: a slow consumer must not stall the copy.
        let _ = self.events_tx.try_send(event);
    }

    /// Copy every listed mailbox, at most `concurrency` at a time. Returns
    /// the per-mailbox failures; an empty list is a clean run.
    pub async fn sync_all(
        self,
        cancel: CancellationToken,
        mailboxes: Vec<String>,
    ) -> Vec<FerryError> {
        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency));
        let engine = Arc::new(self);
        let mut workers = JoinSet::new();

        for name in mailboxes {
            let engine = engine.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                match engine.sync_mailbox(&cancel, &name).await {
                    Ok(()) => None,
                    Err(e) => Some(FerryError::for_mailbox(name, e)),
                }
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Some(e)) => errors.push(e),
                Ok(None) => {}
                Err(e) => errors.push(FerryError::Worker(e.to_string())),
            }
        }
        errors
        // `engine` drops here; with all workers gone the event channel
        // disconnects for the consumer.
    }

    async fn sync_mailbox(&self, cancel: &CancellationToken, name: &str) -> FerryResult<()> {
        if !self.opts.quiet {
            info!(mailbox = name, "start");
        }
        self.emit(SyncEvent::start(name));
        let dst_name = self.opts.mapped(name).to_string();

        let mut dst = self.dst.connect().await?;
        if !self.opts.dry_run {
            dst.ensure_mailbox(&dst_name).await?;
        }

        let mut src = self.src.connect().await?;
        src.select(name, true).await?;

        let min_uid = if self.opts.ignore_state {
            0
        } else {
            self.state.max_uid(name)
        };
        let uids = src
            .uid_search(&SearchCriteria {
                since: self.opts.since,
                min_uid,
                unseen: false,
            })
            .await?;
        if uids.is_empty() {
            if !self.opts.quiet {
                info!(mailbox = name, "no new messages");
            }
            let _ = src.logout().await;
            let _ = dst.logout().await;
            self.emit(SyncEvent::done(name));
            return Ok(());
        }

        let total = uids.len();
        if !self.opts.quiet {
            info!(mailbox = name, total, min_uid, "copying messages");
        }
        self.emit(SyncEvent::progress(name, total, 0));

        let (tx, mut rx) = mpsc::channel(MESSAGE_BUFFER);
        let fetch = tokio::spawn(async move {
            let result = src.fetch_into(&uids, tx).await;
            let _ = src.logout().await;
            result
        });

        let mut done = 0;
        let result = loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(FerryError::Cancelled),
                msg = rx.recv() => msg,
            };
            let Some(msg) = msg else {
                break Ok(());
            };

            let Some(body) = msg.body else {
                if !self.opts.quiet {
                    warn!(mailbox = name, uid = msg.uid, "message has no body, skipped");
                }
                continue;
            };

            if self.opts.dry_run {
                if !self.opts.quiet {
                    info!(
                        mailbox = name,
                        uid = msg.uid,
                        flags = ?msg.flags,
                        "dry-run: would append"
                    );
                }
                done += 1;
                self.emit(SyncEvent::progress(name, total, done));
                continue;
            }

            let date = msg.internal_date.unwrap_or_else(Utc::now);
            // The APPEND immediately follows this worker's own SELECT of
            // the destination mailbox.
            let append = async {
                dst.select(&dst_name, false).await?;
                dst.append(&dst_name, &msg.flags, date, &body).await
            };
            let appended = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(FerryError::Cancelled),
                res = append => res,
            };
            if let Err(e) = appended {
                break Err(e);
            }

            self.state.set_max_uid(name, msg.uid);
            done += 1;
            self.emit(SyncEvent::progress(name, total, done));
        };

        match result {
            Ok(()) => {
                // The channel closed, so the fetch task has finished;
                // surface its verdict.
                match fetch.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(e),
                    Err(e) => return Err(FerryError::Worker(e.to_string())),
                }
                let _ = dst.logout().await;
                self.emit(SyncEvent::done(name));
                Ok(())
            }
            Err(e) => {
                fetch.abort();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockConnector, MockServer};
    use crate::sync::events::EventKind;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn since(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn options(concurrency: usize) -> SyncOptions {
        SyncOptions {
            concurrency,
            quiet: true,
            ..Default::default()
        }
    }

    /// Two-mailbox fixture: INBOX {1,2,3} dated 2024-02-01, Archive
    /// {10,11} dated 2023-12-01.
    fn seeded_source() -> MockConnector {
        let src = MockServer::shared();
        {
            let mut server = src.lock().unwrap();
            for uid in [1, 2, 3] {
                server.seed_message("INBOX", uid, "2024-02-01T10:00:00Z", &["\\Seen"]);
            }
            for uid in [10, 11] {
                server.seed_message("Archive", uid, "2023-12-01T10:00:00Z", &[]);
            }
        }
        MockConnector::new(src)
    }

    #[tokio::test]
    async fn first_run_copies_only_since_matches() {
        let src = seeded_source();
        let dst = MockConnector::fresh();
        let state = Arc::new(SyncState::default());

        let mut opts = options(2);
        opts.since = since(2024, 1, 1);
        let syncer = MailboxSyncer::new(src, dst.clone(), state.clone(), opts);
        let events = syncer.events();

        let errs = syncer
            .sync_all(
                CancellationToken::new(),
                vec!["INBOX".into(), "Archive".into()],
            )
            .await;
        assert!(errs.is_empty(), "{errs:?}");

        assert_eq!(dst.server().lock().unwrap().appended_uids("INBOX"), vec![1, 2, 3]);
        assert_eq!(dst.server().lock().unwrap().append_count("Archive"), 0);
        assert_eq!(state.max_uid("INBOX"), 3);
        assert_eq!(state.max_uid("Archive"), 0);

        // Flags and INTERNALDATE survive the copy.
        let appends = dst.server().lock().unwrap().appends("INBOX");
        assert!(appends.iter().all(|r| r.flags == ["\\Seen"]));
        assert!(appends
            .iter()
            .all(|r| r.date.date_naive().to_string() == "2024-02-01"));

        // Progress for INBOX ends at 3/3; the channel is disconnected.
        let collected: Vec<_> = events.drain().collect();
        let last_inbox = collected
            .iter()
            .filter(|e| e.kind == EventKind::MailboxProgress && e.mailbox == "INBOX")
            .last()
            .expect("progress events for INBOX");
        assert_eq!((last_inbox.total, last_inbox.done), (3, 3));
        assert!(events.is_disconnected());
    }

    #[tokio::test]
    async fn completed_run_repeats_as_noop() {
        let src = seeded_source();
        let dst = MockConnector::fresh();
        let state = Arc::new(SyncState::default());
        state.set_max_uid("INBOX", 3);

        let mut opts = options(2);
        opts.since = since(2024, 1, 1);
        let syncer = MailboxSyncer::new(src, dst.clone(), state.clone(), opts);
        let events = syncer.events();
        let errs = syncer
            .sync_all(
                CancellationToken::new(),
                vec!["INBOX".into(), "Archive".into()],
            )
            .await;
        assert!(errs.is_empty(), "{errs:?}");

        assert_eq!(dst.server().lock().unwrap().append_count("INBOX"), 0);
        assert_eq!(dst.server().lock().unwrap().append_count("Archive"), 0);
        assert_eq!(state.max_uid("INBOX"), 3);

        let done_events = events
            .drain()
            .filter(|e| e.kind == EventKind::MailboxDone)
            .count();
        assert_eq!(done_events, 2);
    }

    #[tokio::test]
    async fn ignore_state_recopies_without_lowering_watermark() {
        let src = seeded_source();
        let dst = MockConnector::fresh();
        let state = Arc::new(SyncState::default());
        state.set_max_uid("INBOX", 3);

        let mut opts = options(2);
        opts.since = since(2024, 1, 1);
        opts.ignore_state = true;
        let syncer = MailboxSyncer::new(src, dst.clone(), state.clone(), opts);
        let errs = syncer
            .sync_all(CancellationToken::new(), vec!["INBOX".into()])
            .await;
        assert!(errs.is_empty(), "{errs:?}");

        assert_eq!(dst.server().lock().unwrap().append_count("INBOX"), 3);
        assert_eq!(state.max_uid("INBOX"), 3);
    }

    #[tokio::test]
    async fn dry_run_appends_and_checkpoints_nothing() {
        let src = seeded_source();
        let dst = MockConnector::fresh();
        let state = Arc::new(SyncState::default());

        let mut opts = options(1);
        opts.dry_run = true;
        let syncer = MailboxSyncer::new(src, dst.clone(), state.clone(), opts);
        let errs = syncer
            .sync_all(CancellationToken::new(), vec!["INBOX".into()])
            .await;
        assert!(errs.is_empty(), "{errs:?}");

        assert_eq!(dst.server().lock().unwrap().append_count("INBOX"), 0);
        assert!(!dst.server().lock().unwrap().has_mailbox("INBOX"));
        assert_eq!(state.max_uid("INBOX"), 0);
    }

    #[tokio::test]
    async fn missing_body_is_skipped_without_progress() {
        let src = MockServer::shared();
        {
            let mut server = src.lock().unwrap();
            server.seed_message("INBOX", 1, "2024-02-01T10:00:00Z", &[]);
            server.seed_bodyless("INBOX", 2, "2024-02-01T10:00:00Z");
            server.seed_message("INBOX", 3, "2024-02-01T10:00:00Z", &[]);
        }
        let dst = MockConnector::fresh();
        let state = Arc::new(SyncState::default());

        let syncer =
            MailboxSyncer::new(MockConnector::new(src), dst.clone(), state.clone(), options(1));
        let errs = syncer
            .sync_all(CancellationToken::new(), vec!["INBOX".into()])
            .await;
        assert!(errs.is_empty(), "{errs:?}");

        assert_eq!(dst.server().lock().unwrap().appended_uids("INBOX"), vec![1, 3]);
        assert_eq!(state.max_uid("INBOX"), 3);
    }

    #[tokio::test]
    async fn per_mailbox_failures_do_not_stop_other_workers() {
        let src = seeded_source();
        let dst = MockConnector::fresh();
        dst.server().lock().unwrap().fail_appends_to("INBOX");
        let state = Arc::new(SyncState::default());

        let syncer = MailboxSyncer::new(src, dst.clone(), state.clone(), options(2));
        let errs = syncer
            .sync_all(
                CancellationToken::new(),
                vec!["INBOX".into(), "Archive".into()],
            )
            .await;

        assert_eq!(errs.len(), 1);
        assert!(errs[0].to_string().starts_with("INBOX: "), "{}", errs[0]);
        // The other worker finished its copy.
        assert_eq!(dst.server().lock().unwrap().appended_uids("Archive"), vec![10, 11]);
        assert_eq!(state.max_uid("Archive"), 11);
    }

    #[tokio::test]
    async fn cancellation_surfaces_and_keeps_watermark_monotone() {
        let src = seeded_source();
        let dst = MockConnector::fresh();
        dst.server().lock().unwrap().set_append_delay(Duration::from_millis(40));

        let state = Arc::new(SyncState::default());
        let mut opts = options(2);
        opts.since = since(2024, 1, 1);
        let syncer = MailboxSyncer::new(src, dst.clone(), state.clone(), opts);
        let events = syncer.events();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        let watcher = tokio::spawn(async move {
            // Cancel as soon as the first APPEND lands.
            loop {
                match events.recv_async().await {
                    Ok(e) if e.kind == EventKind::MailboxProgress && e.done >= 1 => {
                        canceller.cancel();
                        break;
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        });

        let errs = syncer
            .sync_all(cancel, vec!["INBOX".into(), "Archive".into()])
            .await;
        watcher.await.unwrap();

        assert!(!errs.is_empty());
        assert!(errs.iter().any(|e| e.is_cancelled()), "{errs:?}");
        let max = state.max_uid("INBOX");
        assert!((1..=3).contains(&max), "max_uid {max}");
    }
}
