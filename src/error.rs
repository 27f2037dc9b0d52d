use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Required configuration is missing or unreadable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session-level mailbox failure (connect, login, select, search).
    #[error("Mailbox connection error: {0}")]
    Connection(String),

    /// A single message could not be retrieved.
    #[error("Could not fetch message {id}: {reason}")]
    Fetch { id: u32, reason: String },

    /// The language-model call failed.
    #[error("Summarization failed: {0}")]
    Summarize(String),

    /// A MIME part's transfer encoding could not be undone.
    #[error("Could not decode message part: {0}")]
    Decode(String),

    /// HTML could not be rendered as text.
    #[error("HTML conversion failed: {0}")]
    Html(String),

    /// The report could not be written.
    #[error("Could not write report to '{path}': {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the errors that stop a run before any message is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Connection(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Summarize(e.to_string())
    }
}

impl From<imap::Error> for Error {
    fn from(e: imap::Error) -> Self {
        Self::Connection(e.to_string())
    }
}
