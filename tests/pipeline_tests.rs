//! End-to-end runs of the summarization pipeline against an in-memory mailbox.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

use mail_digest::config::Config;
use mail_digest::domain::email::{MessageId, RawMessage};
use mail_digest::error::{Error, Result};
use mail_digest::mail::transport::{Credentials, MailSession, MailTransport};
use mail_digest::pipeline::{Pipeline, RunOutcome, RunSummary};
use mail_digest::summarize::{SUMMARY_FAILED, TextGenerator};

// ─── Fakes ──────────────────────────────────────────────────────────

type CallLog = Rc<RefCell<Vec<String>>>;

#[derive(Default)]
struct FakeMailbox {
    messages: BTreeMap<MessageId, Vec<u8>>,
    broken: BTreeSet<MessageId>,
    reject_login: bool,
    fail_search: bool,
    log: CallLog,
}

impl FakeMailbox {
    fn with_messages(messages: impl IntoIterator<Item = (MessageId, String)>) -> Self {
        Self {
            messages: messages
                .into_iter()
                .map(|(id, raw)| (id, raw.into_bytes()))
                .collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

struct FakeSession {
    messages: BTreeMap<MessageId, Vec<u8>>,
    broken: BTreeSet<MessageId>,
    fail_search: bool,
    log: CallLog,
}

impl MailTransport for FakeMailbox {
    type Session = FakeSession;

    fn connect(&self, credentials: &Credentials) -> Result<FakeSession> {
        self.log
            .borrow_mut()
            .push(format!("connect {}", credentials.address));
        if self.reject_login {
            return Err(Error::Connection(format!(
                "login failed for {}",
                credentials.address
            )));
        }
        Ok(FakeSession {
            messages: self.messages.clone(),
            broken: self.broken.clone(),
            fail_search: self.fail_search,
            log: Rc::clone(&self.log),
        })
    }
}

impl MailSession for FakeSession {
    fn select_mailbox(&mut self, name: &str) -> Result<()> {
        self.log.borrow_mut().push(format!("select {name}"));
        Ok(())
    }

    fn search_unread(&mut self) -> Result<Vec<MessageId>> {
        self.log.borrow_mut().push("search".to_string());
        if self.fail_search {
            return Err(Error::Connection("connection reset during SEARCH".into()));
        }
        Ok(self.messages.keys().copied().collect())
    }

    fn fetch(&mut self, id: MessageId) -> Result<RawMessage> {
        self.log.borrow_mut().push(format!("fetch {id}"));
        if self.broken.contains(&id) {
            return Err(Error::Fetch {
                id,
                reason: "server returned no body".into(),
            });
        }
        let bytes = self.messages.get(&id).cloned().ok_or(Error::Fetch {
            id,
            reason: "no such message".into(),
        })?;
        Ok(RawMessage { id, bytes })
    }

    fn close(&mut self) -> Result<()> {
        self.log.borrow_mut().push("close".to_string());
        Ok(())
    }
}

/// Replies with the subject line it finds in the prompt.
struct EchoSubject;

impl TextGenerator for EchoSubject {
    fn generate(&self, prompt: &str) -> Result<String> {
        let subject = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Subject: "))
            .unwrap_or("?");
        Ok(format!("  - about {subject}\n- second point\n"))
    }
}

/// Keeps every prompt it is given.
#[derive(Default)]
struct Recorder {
    prompts: RefCell<Vec<String>>,
}

impl Recorder {
    fn bodies(&self) -> Vec<String> {
        self.prompts
            .borrow()
            .iter()
            .map(|p| {
                let body = p.split_once("Body:\n").map_or("", |(_, rest)| rest);
                body.split_once("\n\nProvide the summary")
                    .map_or(body, |(body, _)| body)
                    .to_string()
            })
            .collect()
    }
}

impl TextGenerator for Recorder {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok("- noted".to_string())
    }
}

struct AlwaysFails;

impl TextGenerator for AlwaysFails {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::Summarize("HTTP 503 Service Unavailable".into()))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn plain(subject: &str, body: &str) -> String {
    format!(
        "From: Alice <alice@example.com>\r\n\
         Subject: {subject}\r\n\
         Date: Mon, 1 Jan 2024 10:00:00 +0000\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    )
}

fn attachments_only() -> String {
    "From: scanner@example.com\r\n\
     Subject: Scan\r\n\
     Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
     \r\n\
     --b1\r\n\
     Content-Type: application/pdf\r\n\
     Content-Disposition: attachment; filename=\"scan.pdf\"\r\n\
     Content-Transfer-Encoding: base64\r\n\
     \r\n\
     JVBERi0xLjQK\r\n\
     --b1--\r\n"
        .to_string()
}

fn alternative_quoted_printable() -> String {
    "From: =?UTF-8?Q?Ren=C3=A9e?= <renee@example.com>\r\n\
     Subject: Opening hours\r\n\
     Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
     \r\n\
     --alt\r\n\
     Content-Type: text/plain; charset=iso-8859-1\r\n\
     Content-Transfer-Encoding: quoted-printable\r\n\
     \r\n\
     Caf=E9 opens at nine, see =\r\n\
     you there.\r\n\
     --alt\r\n\
     Content-Type: text/html; charset=utf-8\r\n\
     \r\n\
     <p>HTML version of the hours</p>\r\n\
     --alt--\r\n"
        .to_string()
}

fn html_only_base64() -> String {
    "From: news@example.com\r\n\
     Subject: Launch\r\n\
     Content-Type: text/html; charset=utf-8\r\n\
     Content-Transfer-Encoding: base64\r\n\
     \r\n\
     PGh0bWw+PGJvZHk+PGgxPkxhdW5jaDwvaDE+PHA+U2VlIDxhIGhyZWY9Imh0dHBzOi8vZXhhbXBs\r\n\
     ZS5jb20vcGxhbiI+dGhlIHBsYW48L2E+IGJlZm9yZSBNb25kYXkuPC9wPjwvYm9keT48L2h0bWw+\r\n"
        .to_string()
}

fn config(output: &Path, limit: usize) -> Config {
    let mut cfg = Config::default();
    cfg.email_address = Some("me@example.com".into());
    cfg.email_password = Some("app-password".into());
    cfg.gemini_api_key = Some("key".into());
    cfg.output = output.to_path_buf();
    cfg.limit = limit;
    cfg
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::NothingToDo => panic!("expected a completed run"),
    }
}

fn without_timestamp(report: &str) -> String {
    report
        .lines()
        .filter(|l| !l.starts_with("Generated on:"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Test 1: Happy path ─────────────────────────────────────────────

#[test]
fn test_three_unread_messages_produce_three_entries() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("email_summaries.md");
    let mailbox = FakeMailbox::with_messages([
        (3, plain("Invoice", "Please pay by Friday.")),
        (7, plain("Lunch", "Noon at the usual place?")),
        (9, plain("Release", "Version 2 ships tomorrow.")),
    ]);

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let summary = completed(pipeline.run().unwrap());

    assert_eq!(summary.unread_found, 3);
    assert_eq!(summary.deferred, 0);
    assert!(summary.persisted.is_ok());

    let subjects: Vec<&str> = summary
        .report
        .entries()
        .iter()
        .map(|e| e.subject.as_str())
        .collect();
    assert_eq!(subjects, ["Invoice", "Lunch", "Release"]);
    assert_eq!(
        summary.report.entries()[0].summary,
        "- about Invoice\n- second point"
    );

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.starts_with("# Email Summaries\n\nGenerated on: "));
    assert!(written.contains("## Email 1\n\n**From:** Alice <alice@example.com>\n"));
    assert!(written.contains("**Date:** Mon, 1 Jan 2024 10:00:00 +0000\n"));
    assert!(written.contains("## Email 3\n\n"));
    assert!(!written.contains("## Email 4"));

    let calls = mailbox.calls();
    assert_eq!(calls[0], "connect me@example.com");
    assert_eq!(calls[1], "select INBOX");
    assert_eq!(calls.last().map(String::as_str), Some("close"));
    assert_eq!(mailbox.count("close"), 1);
}

// ─── Test 2: Limit caps fetches ─────────────────────────────────────

#[test]
fn test_limit_caps_processing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox =
        FakeMailbox::with_messages((1..=12).map(|id| (id, plain(&format!("Mail {id}"), "Hi"))));

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let summary = completed(pipeline.run().unwrap());

    assert_eq!(summary.unread_found, 12);
    assert_eq!(summary.deferred, 2);
    assert_eq!(summary.report.len(), 10);
    assert_eq!(mailbox.count("fetch"), 10);
    assert!(!mailbox.calls().contains(&"fetch 11".to_string()));
    assert_eq!(summary.report.entries()[9].subject, "Mail 10");
}

// ─── Test 3: Summarizer failures become placeholders ────────────────

#[test]
fn test_failing_summarizer_yields_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox = FakeMailbox::with_messages([
        (1, plain("One", "first body")),
        (2, attachments_only()),
        (3, plain("Three", "third body")),
    ]);

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, AlwaysFails);
    let summary = completed(pipeline.run().unwrap());

    assert_eq!(summary.skipped_empty, 1);
    assert_eq!(summary.report.len(), 2);
    assert!(
        summary
            .report
            .entries()
            .iter()
            .all(|e| e.summary == SUMMARY_FAILED)
    );

    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written.matches(SUMMARY_FAILED).count(), 2);
    assert!(!written.contains("Scan"));
    assert!(written.contains("## Email 2\n\n**From:** Alice <alice@example.com>\n"));
}

// ─── Test 4: Rejected login ─────────────────────────────────────────

#[test]
fn test_rejected_login_aborts_without_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox = FakeMailbox {
        reject_login: true,
        ..FakeMailbox::with_messages([(1, plain("One", "body"))])
    };

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let err = pipeline.run().unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert!(err.is_fatal());
    assert!(!out.exists());
    assert_eq!(mailbox.count("search"), 0);
}

// ─── Test 5: Missing configuration ──────────────────────────────────

#[test]
fn test_missing_api_key_stops_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mut cfg = config(&out, 10);
    cfg.gemini_api_key = None;
    let mailbox = FakeMailbox::with_messages([(1, plain("One", "body"))]);

    let pipeline = Pipeline::new(cfg, &mailbox, EchoSubject);
    let err = pipeline.run().unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("GEMINI_API_KEY"));
    assert!(mailbox.calls().is_empty());
    assert!(!out.exists());
}

// ─── Test 6: One broken message does not stop the run ───────────────

#[test]
fn test_fetch_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mut mailbox = FakeMailbox::with_messages([
        (1, plain("First", "a")),
        (2, plain("Second", "b")),
        (3, plain("Third", "c")),
    ]);
    mailbox.broken.insert(2);

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let summary = completed(pipeline.run().unwrap());

    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.report.len(), 2);
    assert_eq!(mailbox.count("fetch"), 3);

    let written = std::fs::read_to_string(&out).unwrap();
    assert!(written.contains("## Email 1\n"));
    assert!(written.contains("## Email 2\n"));
    assert!(!written.contains("## Email 3\n"));
    assert!(!written.contains("Second"));
    assert!(written.contains("**Subject:** Third"));
}

// ─── Test 7: Session failure after login ────────────────────────────

#[test]
fn test_search_failure_closes_session() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox = FakeMailbox {
        fail_search: true,
        ..FakeMailbox::with_messages([(1, plain("One", "body"))])
    };

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let err = pipeline.run().unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(mailbox.count("close"), 1);
    assert_eq!(mailbox.count("fetch"), 0);
    assert!(!out.exists());
}

// ─── Test 8: Nothing unread ─────────────────────────────────────────

#[test]
fn test_empty_mailbox_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    std::fs::write(&out, "previous report").unwrap();
    let mailbox = FakeMailbox::default();

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let outcome = pipeline.run().unwrap();

    assert!(matches!(outcome, RunOutcome::NothingToDo));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous report");
    assert_eq!(mailbox.count("close"), 1);
}

// ─── Test 9: Same mailbox, same report ──────────────────────────────

#[test]
fn test_rerun_is_identical_apart_from_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox = FakeMailbox::with_messages([
        (4, plain("=?UTF-8?B?Q2Fmw6k=?= menu", "Soup of the day.")),
        (5, plain("Notes", "See attached notes.")),
    ]);
    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);

    completed(pipeline.run().unwrap());
    let first = std::fs::read_to_string(&out).unwrap();
    completed(pipeline.run().unwrap());
    let second = std::fs::read_to_string(&out).unwrap();

    assert!(first.contains("**Subject:** Café menu"));
    assert_eq!(without_timestamp(&first), without_timestamp(&second));
}

// ─── Test 10: Unwritable output keeps the report ────────────────────

#[test]
fn test_persist_failure_keeps_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("no_such_dir").join("out.md");
    let mailbox = FakeMailbox::with_messages([(1, plain("Only", "body"))]);

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, EchoSubject);
    let summary = completed(pipeline.run().unwrap());

    assert!(matches!(summary.persisted, Err(Error::Persist { .. })));
    assert_eq!(summary.report.len(), 1);
    assert!(summary.report.render().contains("**Subject:** Only"));
}

// ─── Test 11: Transfer-encoded bodies reach the summarizer as text ──

#[test]
fn test_quoted_printable_plain_text_beats_html() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox = FakeMailbox::with_messages([(1, alternative_quoted_printable())]);
    let recorder = Recorder::default();

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, &recorder);
    let summary = completed(pipeline.run().unwrap());

    assert_eq!(recorder.bodies(), ["Café opens at nine, see you there."]);
    assert_eq!(summary.report.entries()[0].sender, "Renée <renee@example.com>");
    assert_eq!(summary.report.entries()[0].subject, "Opening hours");
}

#[test]
fn test_base64_html_only_message_is_converted() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.md");
    let mailbox = FakeMailbox::with_messages([(1, html_only_base64())]);
    let recorder = Recorder::default();

    let pipeline = Pipeline::new(config(&out, 10), &mailbox, &recorder);
    let summary = completed(pipeline.run().unwrap());

    let bodies = recorder.bodies();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert!(body.contains("Launch"), "{body}");
    assert!(body.contains("[the plan](https://example.com/plan)"), "{body}");
    assert!(body.contains("before Monday."), "{body}");
    assert!(!body.contains('<'), "{body}");
    assert!(!body.contains("PGh0bWw"), "{body}");
    assert_eq!(summary.report.len(), 1);
}
