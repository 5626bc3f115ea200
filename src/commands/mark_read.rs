//! `mark-read`: set \Seen on matching messages across mailboxes.

use tracing::info;

use super::{build_filter, filtered_mailboxes, parse_since, source_endpoint};
use crate::backend::{MailStore, SearchCriteria};
use crate::cli::MarkReadArgs;
use crate::error::FerryResult;

pub async fn run(args: MarkReadArgs) -> FerryResult<()> {
    let since = parse_since(&args.since)?;
    let endpoint = source_endpoint(&args.source, &args.tls)?;
    let filter = build_filter(&args.filter)?;

    let mut store = endpoint.connect().await?;
    let mailboxes = filtered_mailboxes(&mut store, &filter).await?;
    if mailboxes.is_empty() {
        println!("No mailboxes to process.");
        let _ = store.logout().await;
        return Ok(());
    }

    let criteria = SearchCriteria {
        since,
        min_uid: 0,
        unseen: args.unseen_only,
    };

    let mut total = 0usize;
    for mailbox in &mailboxes {
        store.select(mailbox, false).await?;
        let uids = store.uid_search(&criteria).await?;
        if uids.is_empty() {
            if args.verbose {
                info!(mailbox, "nothing to mark");
            }
            continue;
        }
        if args.dry_run {
            println!("[dry-run] {}: would mark {} message(s) read", mailbox, uids.len());
            continue;
        }
        store.store_flag(&uids, "\\Seen").await?;
        println!("{}: marked {} message(s) read", mailbox, uids.len());
        total += uids.len();
    }

    if !args.dry_run {
        println!("Done: {} message(s) marked read.", total);
    }
    let _ = store.logout().await;
    Ok(())
}
