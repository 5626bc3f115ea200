//! `backup`: download mailboxes into per-message files or mbox archives.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;
use tracing::info;

use super::{build_filter, filtered_mailboxes, parse_since, source_endpoint};
use crate::backend::{FetchedMessage, MailStore, SearchCriteria};
use crate::cli::BackupArgs;
use crate::error::{FerryError, FerryResult};
use crate::mbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    SingleFile,
    Mbox,
}

pub async fn run(args: BackupArgs) -> FerryResult<()> {
    let format = match args.format.as_str() {
        "single-file" => Format::SingleFile,
        "mbox" => Format::Mbox,
        other => {
            return Err(FerryError::InvalidInput(format!(
                "invalid --format: {} (must be 'single-file' or 'mbox')",
                other
            )))
        }
    };
    let since = parse_since(&args.since)?;
    let endpoint = source_endpoint(&args.source, &args.tls)?;
    let filter = build_filter(&args.filter)?;

    std::fs::create_dir_all(&args.output_dir)
        .map_err(|e| FerryError::InvalidInput(format!("create output-dir: {}", e)))?;

    let mut store = endpoint.connect().await?;
    let mailboxes = filtered_mailboxes(&mut store, &filter).await?;
    if mailboxes.is_empty() {
        println!("No mailboxes to download.");
        let _ = store.logout().await;
        return Ok(());
    }

    for mailbox in &mailboxes {
        if let Err(e) = download_mailbox(&mut store, mailbox, since, format, &args).await {
            eprintln!("[{}] error: {}", mailbox, e);
        }
    }
    let _ = store.logout().await;
    Ok(())
}

async fn download_mailbox(
    store: &mut impl MailStore,
    mailbox: &str,
    since: Option<NaiveDate>,
    format: Format,
    args: &BackupArgs,
) -> FerryResult<()> {
    store.select(mailbox, true).await?;
    let uids = store
        .uid_search(&SearchCriteria {
            since,
            ..Default::default()
        })
        .await?;
    if uids.is_empty() {
        if args.verbose {
            info!(mailbox, "no messages to download");
        }
        return Ok(());
    }

    let base = mailbox_path(&args.output_dir, mailbox);
    let mut mbox_writer = match format {
        Format::SingleFile => {
            std::fs::create_dir_all(&base)?;
            None
        }
        Format::Mbox => {
            if let Some(parent) = base.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let path = base.with_extension("mbox");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            Some((BufWriter::new(file), path))
        }
    };

    let (tx, mut rx) = mpsc::channel::<FetchedMessage>(64);
    let fetch = store.fetch_into(&uids, tx);
    let consume = async {
        let mut count = 0usize;
        while let Some(msg) = rx.recv().await {
            let Some(body) = msg.body else { continue };
            match &mut mbox_writer {
                None => {
                    let out = base.join(format!("{}.eml", msg.uid));
                    // Existing files are the resume mechanism.
                    if out.exists() {
                        if args.verbose {
                            info!(mailbox, path = %out.display(), "skip existing");
                        }
                        continue;
                    }
                    write_eml(&out, &body)?;
                    if args.verbose {
                        info!(mailbox, path = %out.display(), "wrote");
                    }
                }
                Some((writer, _)) => {
                    let date = msg.internal_date.unwrap_or_else(Utc::now);
                    mbox::append_message(writer, &body, date)?;
                }
            }
            count += 1;
        }
        Ok::<usize, FerryError>(count)
    };

    let (fetch_res, count) = tokio::join!(fetch, consume);
    fetch_res?;
    let count = count?;

    match mbox_writer {
        Some((mut writer, path)) => {
            writer.flush()?;
            if args.verbose {
                info!(mailbox, count, path = %path.display(), "appended messages");
            }
        }
        None => {
            if args.verbose {
                info!(mailbox, count, "downloaded messages");
            }
        }
    }
    Ok(())
}

fn write_eml(path: &Path, body: &[u8]) -> FerryResult<()> {
    let mut file = File::create(path)?;
    file.write_all(body)?;
    Ok(())
}

/// Build a safe path under `output_dir` following the mailbox hierarchy.
fn mailbox_path(output_dir: &Path, mailbox: &str) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    for part in mailbox.split('/') {
        let part = part.trim().trim_matches(|c| c == '.' || c == ' ');
        let part = part.replace("..", "_").replace(std::path::MAIN_SEPARATOR, "_");
        if part.is_empty() {
            path.push("_");
        } else {
            path.push(part);
        }
    }
    path
}
