use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type FerryResult<T> = Result<T, FerryError>;

#[derive(Debug, thiserror::Error)]
pub enum FerryError {
    #[error("connect: {0}")]
    Connect(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("imap: {0}")]
    Imap(String),

    #[error("smtp: {0}")]
    Smtp(String),

    #[error("state file {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mbox: {0}")]
    Mbox(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{mailbox}: {source}")]
    Mailbox {
        mailbox: String,
        #[source]
        source: Box<FerryError>,
    },

    #[error("worker: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FerryError {
    /// Wrap a per-mailbox failure with the mailbox name for the run's
    /// aggregated error list.
    pub fn for_mailbox(mailbox: impl Into<String>, source: FerryError) -> Self {
        FerryError::Mailbox {
            mailbox: mailbox.into(),
            source: Box::new(source),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            FerryError::Cancelled => true,
            FerryError::Mailbox { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for FerryError {
    fn from(e: serde_json::Error) -> Self {
        FerryError::InvalidInput(format!("state JSON: {}", e))
    }
}

impl From<regex::Error> for FerryError {
    fn from(e: regex::Error) -> Self {
        FerryError::InvalidInput(format!("regex: {}", e))
    }
}
