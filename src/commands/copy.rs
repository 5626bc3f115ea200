//! `copy`: IMAP→IMAP sync or mbox→IMAP import.

use std::sync::Arc;

use tracing::info;

use super::{
    build_filter, cancel_on_ctrl_c, dest_endpoint, filtered_mailboxes, parse_mappings,
    parse_since, source_endpoint,
};
use crate::backend::MailStore;
use crate::cli::CopyArgs;
use crate::error::FerryResult;
use crate::progress;
use crate::state::SyncState;
use crate::sync::{MailboxSyncer, MboxCopier, SyncOptions};

pub async fn run(args: CopyArgs) -> FerryResult<()> {
    let since = parse_since(&args.since)?;
    let opts = SyncOptions {
        dry_run: args.dry_run,
        since,
        concurrency: args.concurrency,
        quiet: !args.verbose,
        ignore_state: args.ignore_state,
        map: parse_mappings(&args.map),
    };

    match args.mbox.clone() {
        Some(path) => run_mbox(args, path, opts).await,
        None => run_imap(args, opts).await,
    }
}

async fn run_imap(args: CopyArgs, opts: SyncOptions) -> FerryResult<()> {
    let src = source_endpoint(&args.source, &args.tls)?;
    let dst = dest_endpoint(&args.dest, &args.tls)?;
    let filter = build_filter(&args.filter)?;

    let state = Arc::new(SyncState::load(&args.state_file)?);

    // Discovery runs on its own connection; the engine's workers dial
    // their own pairs.
    let mut discovery = src.connect().await?;
    let mailboxes = filtered_mailboxes(&mut discovery, &filter).await?;
    let _ = discovery.logout().await;

    if mailboxes.is_empty() {
        println!("No mailboxes to process.");
        return Ok(());
    }

    if args.verbose {
        let resumed = mailboxes
            .iter()
            .filter(|m| state.max_uid(m) > 0)
            .count();
        info!(
            mailboxes = mailboxes.len(),
            concurrency = opts.concurrency,
            dry_run = opts.dry_run,
            ignore_state = opts.ignore_state,
            state_file = %args.state_file.display(),
            resumed,
            "starting sync"
        );
    }

    let syncer = MailboxSyncer::new(src, dst, state.clone(), opts);
    let events = syncer.events();
    let display = tokio::spawn(progress::render(events));

    let cancel = cancel_on_ctrl_c();
    let errors = syncer.sync_all(cancel, mailboxes).await;

    let (done, total) = display.await.unwrap_or((0, 0));
    if errors.is_empty() && done == 0 && total == 0 {
        println!("No new messages detected. Resume state may be active.");
        println!("Use --ignore-state or a fresh --state-file to process everything again.");
    }
    if !errors.is_empty() {
        eprintln!("Finished with errors:");
        for e in &errors {
            eprintln!(" - {}", e);
        }
    }

    state.save(&args.state_file)?;
    Ok(())
}

async fn run_mbox(args: CopyArgs, path: std::path::PathBuf, opts: SyncOptions) -> FerryResult<()> {
    let dst = dest_endpoint(&args.dest, &args.tls)?;

    let state = Arc::new(SyncState::load(&args.state_file)?);
    let mut store = dst.connect().await?;

    let copier = MboxCopier::new(state, args.state_file.clone(), opts);
    let events = copier.events();
    let display = tokio::spawn(progress::render(events));

    let cancel = cancel_on_ctrl_c();
    let result = copier
        .copy(&mut store, &cancel, &path, &args.dst_mailbox)
        .await;
    let _ = store.logout().await;
    let _ = display.await;

    result
}
