//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mailferry", version, about = "Copy, back up and manage mail across IMAP accounts and mbox archives")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy emails from IMAP or an mbox archive to a destination IMAP account
    Copy(CopyArgs),
    /// Download emails from IMAP into local files or mbox archives
    Backup(BackupArgs),
    /// Send an email via SMTP
    Send(SendArgs),
    /// Mark matching messages as read (\Seen)
    MarkRead(MarkReadArgs),
    /// Flag matching messages as \Deleted, with confirmation
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source IMAP host
    #[arg(long = "src-host")]
    pub src_host: Option<String>,
    /// Source IMAP port
    #[arg(long = "src-port", default_value_t = 993)]
    pub src_port: u16,
    /// Source IMAP username
    #[arg(long = "src-user")]
    pub src_user: Option<String>,
    /// Source IMAP password
    #[arg(long = "src-pass")]
    pub src_pass: Option<String>,
    /// Prompt for the source IMAP password (no echo)
    #[arg(long = "src-pass-prompt")]
    pub src_pass_prompt: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DestArgs {
    /// Destination IMAP host
    #[arg(long = "dst-host")]
    pub dst_host: Option<String>,
    /// Destination IMAP port
    #[arg(long = "dst-port", default_value_t = 993)]
    pub dst_port: u16,
    /// Destination IMAP username
    #[arg(long = "dst-user")]
    pub dst_user: Option<String>,
    /// Destination IMAP password
    #[arg(long = "dst-pass")]
    pub dst_pass: Option<String>,
    /// Prompt for the destination IMAP password (no echo)
    #[arg(long = "dst-pass-prompt")]
    pub dst_pass_prompt: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TlsArgs {
    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
    /// Use STARTTLS instead of implicit TLS
    #[arg(long)]
    pub starttls: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Regex of mailboxes to include
    #[arg(long)]
    pub include: Option<String>,
    /// Regex of mailboxes to exclude
    #[arg(long)]
    pub exclude: Option<String>,
    /// Skip common special folders (Trash/Junk/Drafts/Sent)
    #[arg(long = "skip-special")]
    pub skip_special: bool,
    /// Skip Trash folders
    #[arg(long = "skip-trash")]
    pub skip_trash: bool,
    /// Skip Junk/Spam folders
    #[arg(long = "skip-junk")]
    pub skip_junk: bool,
    /// Skip Drafts folders
    #[arg(long = "skip-drafts")]
    pub skip_drafts: bool,
    /// Skip Sent folders
    #[arg(long = "skip-sent")]
    pub skip_sent: bool,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Read from a local mbox file instead of a source IMAP account
    #[arg(long)]
    pub mbox: Option<PathBuf>,
    /// Destination mailbox name when using --mbox
    #[arg(long = "dst-mailbox", default_value = "INBOX")]
    pub dst_mailbox: String,

    #[command(flatten)]
    pub dest: DestArgs,
    #[command(flatten)]
    pub tls: TlsArgs,
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only copy messages with INTERNALDATE >= since (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,
    /// Don't actually copy, just list actions
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Number of mailboxes to copy in parallel
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,
    /// Path to the resume state JSON
    #[arg(long = "state-file", default_value = "mailferry-state.json")]
    pub state_file: PathBuf,
    /// Ignore resume state (start from UID 0)
    #[arg(long = "ignore-state")]
    pub ignore_state: bool,
    /// Folder mapping src=dst (repeatable)
    #[arg(long = "map")]
    pub map: Vec<String>,
    /// Enable detailed per-mailbox logs
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub tls: TlsArgs,
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only download messages with INTERNALDATE >= since (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,
    /// Directory to store downloaded emails
    #[arg(long = "output-dir", default_value = "mailferry-backup")]
    pub output_dir: PathBuf,
    /// Storage format: single-file or mbox
    #[arg(long, default_value = "single-file")]
    pub format: String,
    /// Enable detailed logs
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// SMTP server host
    #[arg(long = "smtp-host")]
    pub smtp_host: String,
    /// SMTP server port
    #[arg(long = "smtp-port", default_value_t = 587)]
    pub smtp_port: u16,
    /// SMTP username
    #[arg(long = "smtp-user")]
    pub smtp_user: Option<String>,
    /// SMTP password
    #[arg(long = "smtp-pass")]
    pub smtp_pass: Option<String>,
    /// Prompt for the SMTP password (no echo)
    #[arg(long = "smtp-pass-prompt")]
    pub smtp_pass_prompt: bool,
    /// Use STARTTLS (recommended for port 587)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub starttls: bool,
    /// Use implicit TLS (recommended for port 465)
    #[arg(long)]
    pub ssl: bool,
    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,
    /// From email address
    #[arg(long)]
    pub from: String,
    /// Recipient email address (repeatable)
    #[arg(long = "to")]
    pub to: Vec<String>,
    /// Email subject
    #[arg(long)]
    pub subject: Option<String>,
    /// Email body (text/plain)
    #[arg(long)]
    pub body: Option<String>,
    /// Read the body from a file
    #[arg(long = "body-file")]
    pub body_file: Option<PathBuf>,
    /// Send a raw RFC 822 message from a file (overrides other fields)
    #[arg(long = "raw-file")]
    pub raw_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MarkReadArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub tls: TlsArgs,
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only mark messages with INTERNALDATE >= since (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,
    /// Restrict to messages that are currently unseen
    #[arg(long = "unseen-only")]
    pub unseen_only: bool,
    /// Don't actually store flags, just report counts
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Enable detailed logs
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub tls: TlsArgs,
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Only delete messages with INTERNALDATE >= since (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<String>,
    /// Expunge mailboxes after flagging (permanent removal)
    #[arg(long)]
    pub expunge: bool,
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
    /// Enable detailed logs
    #[arg(long)]
    pub verbose: bool,
}
