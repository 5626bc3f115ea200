//! `delete`: flag matching messages \Deleted after confirmation, with an
//! optional expunge.

use std::io::{BufRead, Write};

use tracing::info;

use super::{build_filter, filtered_mailboxes, parse_since, source_endpoint};
use crate::backend::{MailStore, SearchCriteria};
use crate::cli::DeleteArgs;
use crate::error::FerryResult;

pub async fn run(args: DeleteArgs) -> FerryResult<()> {
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
        ..Default::default()
    };

    // Count first so the confirmation shows what is at stake.
    let mut counts = Vec::new();
    let mut total = 0usize;
    for mailbox in &mailboxes {
        store.select(mailbox, true).await?;
        let uids = store.uid_search(&criteria).await?;
        total += uids.len();
        counts.push((mailbox.clone(), uids));
    }

    if total == 0 {
        println!("No matching messages.");
        let _ = store.logout().await;
        return Ok(());
    }

    println!("About to flag {} message(s) as \\Deleted:", total);
    for (mailbox, uids) in &counts {
        if !uids.is_empty() {
            println!("  {}: {}", mailbox, uids.len());
        }
    }
    if args.expunge {
        println!("Mailboxes will be expunged afterwards (permanent).");
    }

    if !args.yes && !confirm("Proceed? [y/N] ")? {
        println!("Aborted.");
        let _ = store.logout().await;
        return Ok(());
    }

    for (mailbox, uids) in &counts {
        if uids.is_empty() {
            continue;
        }
        store.select(mailbox, false).await?;
        store.store_flag(uids, "\\Deleted").await?;
        if args.expunge {
            store.expunge().await?;
        }
        if args.verbose {
            info!(mailbox, count = uids.len(), expunged = args.expunge, "flagged");
        }
    }

    println!(
        "Done: {} message(s) flagged{}.",
        total,
        if args.expunge { " and expunged" } else { "" }
    );
    let _ = store.logout().await;
    Ok(())
}

fn confirm(prompt: &str) -> FerryResult<bool> {
    eprint!("{}", prompt);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
