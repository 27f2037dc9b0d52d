//! One summarization run, from login to report.
//!
//! ```text
//! Disconnected → Connected → MailboxSelected → Searching
//!     → Iterating(1..=N) → Finalizing → Disconnected
//! ```
//!
//! Configuration and session-level failures abort the run. Everything that
//! goes wrong with a single message stays with that message. The session is
//! held by a [`SessionGuard`], so it is closed on every exit path.

use std::path::PathBuf;

use chrono::Local;
use log::{info, warn};

use crate::config::Config;
use crate::domain::email::{ExtractedBody, MessageId, SummaryResult};
use crate::error::{Error, Result};
use crate::mail::body::extract_body;
use crate::mail::message::parse_message;
use crate::mail::transport::{MailSession, MailTransport, SessionGuard};
use crate::report::Report;
use crate::summarize::{SUMMARY_FAILED, Summarizer, TextGenerator};

/// Milestones reported to the caller while a run is in progress.
#[derive(Debug)]
pub enum Progress<'a> {
    Connected,
    Found { unread: usize, processing: usize },
    Processing { position: usize, total: usize },
    FetchFailed { position: usize, error: &'a Error },
    Parsed { subject: &'a str },
    SkippedEmpty { position: usize },
    Summarizing { position: usize },
    Summarized { position: usize, failed: bool },
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The mailbox had no unread messages; nothing was written.
    NothingToDo,
    Completed(RunSummary),
}

#[derive(Debug)]
pub struct RunSummary {
    pub unread_found: usize,
    /// Unread messages left for a later run because of the limit.
    pub deferred: usize,
    pub fetch_failures: usize,
    pub skipped_empty: usize,
    pub report: Report,
    pub output: PathBuf,
    /// Outcome of writing the report; the report itself is kept either way.
    pub persisted: Result<()>,
}

pub struct Pipeline<T, G> {
    config: Config,
    transport: T,
    summarizer: Summarizer<G>,
}

impl<T: MailTransport, G: TextGenerator> Pipeline<T, G> {
    pub fn new(config: Config, transport: T, generator: G) -> Self {
        Self {
            config,
            transport,
            summarizer: Summarizer::new(generator),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self) -> Result<RunOutcome> {
        self.run_with(|_| {})
    }

    pub fn run_with(&self, mut progress: impl FnMut(Progress<'_>)) -> Result<RunOutcome> {
        let required = self.config.required()?;

        let session = self
            .transport
            .connect(&required.credentials)
            .map_err(session_level)?;
        let mut session = SessionGuard::new(session);
        info!("logged in as {}", required.credentials.address);
        progress(Progress::Connected);

        session
            .select_mailbox(&self.config.mailbox)
            .map_err(session_level)?;

        let mut ids = session.search_unread().map_err(session_level)?;
        if ids.is_empty() {
            info!("no unread messages in {}", self.config.mailbox);
            return Ok(RunOutcome::NothingToDo);
        }

        let unread_found = ids.len();
        let deferred = cap(&mut ids, self.config.limit);
        info!("{unread_found} unread message(s), processing {}", ids.len());
        if deferred > 0 {
            info!("{deferred} unread message(s) left for a later run (limit {})", self.config.limit);
        }
        progress(Progress::Found {
            unread: unread_found,
            processing: ids.len(),
        });

        let mut report = Report::new(Local::now());
        let mut fetch_failures = 0;
        let mut skipped_empty = 0;
        let total = ids.len();

        for (i, &id) in ids.iter().enumerate() {
            let position = i + 1;
            progress(Progress::Processing { position, total });

            let parsed = match session.fetch(id).and_then(|raw| parse_message(&raw)) {
                Ok(parsed) => parsed,
                Err(error) => {
                    warn!("skipping message {id}: {error}");
                    fetch_failures += 1;
                    progress(Progress::FetchFailed {
                        position,
                        error: &error,
                    });
                    continue;
                }
            };
            progress(Progress::Parsed {
                subject: &parsed.subject,
            });

            let body = match extract_body(&parsed) {
                ExtractedBody::Text(body) => body,
                ExtractedBody::Empty => {
                    info!("message {id} has no usable text, not summarizing");
                    skipped_empty += 1;
                    progress(Progress::SkippedEmpty { position });
                    continue;
                }
            };

            progress(Progress::Summarizing { position });
            let summary = self.summarizer.summarize(&parsed.subject, &body);
            let failed = summary == SUMMARY_FAILED;
            report.push(SummaryResult {
                subject: parsed.subject,
                sender: parsed.sender,
                date: parsed.date,
                summary,
            });
            progress(Progress::Summarized { position, failed });
        }

        let output = self.config.output.clone();
        let persisted = report.write_to(&output);
        match &persisted {
            Ok(()) => info!("wrote {} summaries to {}", report.len(), output.display()),
            Err(e) => warn!("{e}"),
        }

        Ok(RunOutcome::Completed(RunSummary {
            unread_found,
            deferred,
            fetch_failures,
            skipped_empty,
            report,
            output,
            persisted,
        }))
    }
}

/// Keep the first `limit` identifiers (0 keeps all); returns how many were dropped.
fn cap(ids: &mut Vec<MessageId>, limit: usize) -> usize {
    if limit == 0 || ids.len() <= limit {
        return 0;
    }
    let deferred = ids.len() - limit;
    ids.truncate(limit);
    deferred
}

/// Anything that fails before iteration starts ends the run.
fn session_level(e: Error) -> Error {
    match e {
        Error::Connection(_) => e,
        other => Error::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap() {
        let mut ids: Vec<MessageId> = (1..=12).collect();
        assert_eq!(cap(&mut ids, 10), 2);
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());

        let mut ids: Vec<MessageId> = vec![4, 9];
        assert_eq!(cap(&mut ids, 10), 0);
        assert_eq!(ids, vec![4, 9]);

        let mut ids: Vec<MessageId> = (1..=30).collect();
        assert_eq!(cap(&mut ids, 0), 0);
        assert_eq!(ids.len(), 30);
    }

    #[test]
    fn test_session_level_errors_are_fatal() {
        let e = session_level(Error::Fetch {
            id: 3,
            reason: "eof".into(),
        });
        assert!(e.is_fatal());
        assert!(e.to_string().contains("eof"));
    }
}
