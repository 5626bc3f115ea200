//! mailferry - mail migration between IMAP accounts and mbox archives.
//!
//! ## Module organization
//!
//! - `cli`/`commands`: command-line surface and subcommand wiring
//! - `backend`: mail store abstraction and the async-imap adapter
//! - `sync`: the concurrent IMAP→IMAP engine and the mbox→IMAP pipeline
//! - `state`: durable resume state (high-water UIDs, mbox byte offsets)
//! - `mbox`: streaming mboxrd reader/writer
//! - `filter`: include/exclude/special-folder mailbox filtering
//! - `progress`: terminal progress line fed by sync events

pub mod backend;
pub mod cli;
pub mod commands;
pub mod dates;
pub mod error;
pub mod filter;
pub mod mbox;
pub mod progress;
pub mod state;
pub mod sync;

pub use error::{FerryError, FerryResult};
