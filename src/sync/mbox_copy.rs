//! Mbox→IMAP copy pipeline.
//!
//! Streams an mbox archive into a destination mailbox, checkpointing the
//! byte offset past each successfully appended message so an interrupted
//! import resumes where it stopped. The offset key combines the absolute
//! archive path with the destination mailbox, so the same file can feed
//! several mailboxes independently.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::events::{SyncEvent, EVENT_BUFFER};
use super::SyncOptions;
use crate::backend::MailStore;
use crate::dates::message_internal_date;
use crate::error::{FerryError, FerryResult};
use crate::mbox::{count_messages, MboxReader};
use crate::state::{mbox_state_key, SyncState};

pub struct MboxCopier {
    state: Arc<SyncState>,
    state_path: PathBuf,
    opts: SyncOptions,
    events_tx: flume::Sender<SyncEvent>,
    events_rx: flume::Receiver<SyncEvent>,
}

impl MboxCopier {
    pub fn new(state: Arc<SyncState>, state_path: PathBuf, opts: SyncOptions) -> Self {
        let (events_tx, events_rx) = flume::bounded(EVENT_BUFFER);
        MboxCopier {
            state,
            state_path,
            opts,
            events_tx,
            events_rx,
        }
    }

    pub fn events(&self) -> flume::Receiver<SyncEvent> {
        self.events_rx.clone()
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events_tx.try_send(event);
    }

    /// Append every message from `path` past the stored offset into
    /// `dst_mailbox`. Consumes the copier so the event channel disconnects
    /// on return.
    pub async fn copy<D: MailStore>(
        self,
        dst: &mut D,
        cancel: &CancellationToken,
        path: &Path,
        dst_mailbox: &str,
    ) -> FerryResult<()> {
        let abs = std::fs::canonicalize(path)
            .map_err(|e| FerryError::Mbox(format!("open {}: {}", path.display(), e)))?;
        let key = mbox_state_key(&abs, dst_mailbox);

        let start = if self.opts.ignore_state {
            0
        } else {
            self.state.mbox_offset(&key)
        };

        // Sizing pass for the progress display, from the resume offset.
        let total = {
            let mut file = File::open(&abs)
                .map_err(|e| FerryError::Mbox(format!("open {}: {}", abs.display(), e)))?;
            if start > 0 {
                file.seek(SeekFrom::Start(start))
                    .map_err(|e| FerryError::Mbox(format!("seek to {}: {}", start, e)))?;
            }
            count_messages(BufReader::new(file))?
        };

        info!(
            mbox = %abs.display(),
            dst = dst_mailbox,
            total,
            offset = start,
            "importing mbox"
        );
        self.emit(SyncEvent::start(dst_mailbox));
        self.emit(SyncEvent::progress(dst_mailbox, total, 0));

        if !self.opts.dry_run {
            dst.ensure_mailbox(dst_mailbox).await?;
        }

        let mut reader = MboxReader::open(&abs, start)?;
        let mut done = 0;
        loop {
            let Some(msg) = reader.next_message()? else {
                break;
            };
            let date = message_internal_date(&msg.body);

            if self.opts.dry_run {
                if !self.opts.quiet {
                    info!(dst = dst_mailbox, date = %date, "dry-run: would append");
                }
                done += 1;
                self.emit(SyncEvent::progress(dst_mailbox, total, done));
                continue;
            }

            let append = async {
                dst.select(dst_mailbox, false).await?;
                dst.append(dst_mailbox, &[], date, &msg.body).await
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FerryError::Cancelled),
                res = append => res?,
            }

            // `end` is exact here, but the contract is only "past the
            // appended message", which both bounds satisfy.
            let offset = msg.end.max(msg.start);
            self.state.set_mbox_offset(&key, offset);
            self.state.save(&self.state_path)?;

            done += 1;
            self.emit(SyncEvent::progress(dst_mailbox, total, done));
        }

        if !self.opts.dry_run {
            self.state.set_mbox_offset(&key, reader.position());
            self.state.save(&self.state_path)?;
        }
        self.emit(SyncEvent::done(dst_mailbox));
        Ok(())
    }
}
