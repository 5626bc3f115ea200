//! Subcommand implementations (thin wrappers over the engine, the mbox
//! pipeline and the IMAP adapter).

pub mod backup;
pub mod copy;
pub mod delete;
pub mod mark_read;
pub mod send;

use std::collections::HashMap;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::imap::ImapEndpoint;
use crate::backend::MailStore;
use crate::cli::{Cli, Command, DestArgs, FilterArgs, SourceArgs, TlsArgs};
use crate::error::{FerryError, FerryResult};
use crate::filter::{MailboxFilter, SkipFlags};

pub async fn run(cli: Cli) -> FerryResult<()> {
    match cli.command {
        Command::Copy(args) => copy::run(args).await,
        Command::Backup(args) => backup::run(args).await,
        Command::Send(args) => send::run(args).await,
        Command::MarkRead(args) => mark_read::run(args).await,
        Command::Delete(args) => delete::run(args).await,
    }
}

/// Resolve a password from the flag or an interactive no-echo prompt.
fn resolve_password(
    pass: Option<String>,
    prompt: bool,
    label: &str,
) -> FerryResult<Option<String>> {
    match pass {
        Some(p) if !p.is_empty() => Ok(Some(p)),
        _ if prompt => {
            let p = rpassword::prompt_password(format!("{} password: ", label))
                .map_err(|e| FerryError::InvalidInput(format!("read password: {}", e)))?;
            Ok(Some(p))
        }
        _ => Ok(None),
    }
}

fn source_endpoint(source: &SourceArgs, tls: &TlsArgs) -> FerryResult<ImapEndpoint> {
    let (Some(host), Some(user)) = (&source.src_host, &source.src_user) else {
        return Err(FerryError::InvalidInput(
            "missing required flags: --src-host, --src-user, --src-pass".into(),
        ));
    };
    let password = resolve_password(
        source.src_pass.clone(),
        source.src_pass_prompt,
        "Source",
    )?
    .ok_or_else(|| {
        FerryError::InvalidInput("missing --src-pass (or use --src-pass-prompt)".into())
    })?;
    Ok(ImapEndpoint {
        host: host.clone(),
        port: source.src_port,
        user: user.clone(),
        password,
        starttls: tls.starttls,
        insecure: tls.insecure,
    })
}

fn dest_endpoint(dest: &DestArgs, tls: &TlsArgs) -> FerryResult<ImapEndpoint> {
    let (Some(host), Some(user)) = (&dest.dst_host, &dest.dst_user) else {
        return Err(FerryError::InvalidInput(
            "missing required flags: --dst-host, --dst-user, --dst-pass".into(),
        ));
    };
    let password = resolve_password(
        dest.dst_pass.clone(),
        dest.dst_pass_prompt,
        "Destination",
    )?
    .ok_or_else(|| {
        FerryError::InvalidInput("missing --dst-pass (or use --dst-pass-prompt)".into())
    })?;
    Ok(ImapEndpoint {
        host: host.clone(),
        port: dest.dst_port,
        user: user.clone(),
        password,
        starttls: tls.starttls,
        insecure: tls.insecure,
    })
}

fn build_filter(args: &FilterArgs) -> FerryResult<MailboxFilter> {
    MailboxFilter::new(
        args.include.as_deref(),
        args.exclude.as_deref(),
        SkipFlags {
            special: args.skip_special,
            trash: args.skip_trash,
            junk: args.skip_junk,
            drafts: args.skip_drafts,
            sent: args.skip_sent,
        },
    )
}

fn parse_since(since: &Option<String>) -> FerryResult<Option<NaiveDate>> {
    match since {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| {
                FerryError::InvalidInput(format!(
                    "invalid --since date {:?}: {} (expected YYYY-MM-DD)",
                    s, e
                ))
            }),
    }
}

/// `src=dst` pairs into an exact-name mapping; malformed pairs are
/// reported and skipped.
fn parse_mappings(pairs: &[String]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((src, dst)) => {
                map.insert(src.to_string(), dst.to_string());
            }
            None => warn!("invalid --map value (expected src=dst): {}", pair),
        }
    }
    map
}

/// List the server's mailboxes through `store` and apply the filter.
async fn filtered_mailboxes(
    store: &mut impl MailStore,
    filter: &MailboxFilter,
) -> FerryResult<Vec<String>> {
    let all = store.list_mailboxes().await?;
    Ok(filter.apply(&all))
}

/// Token that trips on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            trip.cancel();
        }
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mappings_parse_and_skip_malformed() {
        let map = parse_mappings(&[
            "INBOX=Imported/INBOX".to_string(),
            "bogus".to_string(),
            "Sent=Sent Items".to_string(),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["INBOX"], "Imported/INBOX");
        assert_eq!(map["Sent"], "Sent Items");
    }

    #[test]
    fn since_parsing() {
        assert_eq!(parse_since(&None).unwrap(), None);
        assert_eq!(
            parse_since(&Some("2024-01-01".into())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert!(parse_since(&Some("01.01.2024".into())).is_err());
    }
}
