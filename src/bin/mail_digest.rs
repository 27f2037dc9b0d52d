use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use mail_digest::config::{config_path, load_config};
use mail_digest::error::Error;
use mail_digest::mail::decoders::normalize_snippet;
use mail_digest::mail::imap_client::ImapClient;
use mail_digest::pipeline::{Pipeline, Progress, RunOutcome};
use mail_digest::summarize::GeminiClient;

#[derive(Parser)]
#[command(name = "mail_digest")]
#[command(about = "Summarize unread IMAP mail into a Markdown report", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/mail_digest/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of unread emails to process (0 = no limit)
    #[arg(long)]
    limit: Option<usize>,

    /// Report file, overwritten on every run
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let rule = "=".repeat(60);
    println!("{rule}\nAI Email Summarizer\n{rule}\n");

    let mut cfg = load_config(cli.config.as_deref())?;
    if let Some(limit) = cli.limit {
        cfg.limit = limit;
    }
    if let Some(output) = cli.output {
        cfg.output = output;
    }

    let required = match cfg.required() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ {e}");
            let location = cli
                .config
                .or_else(|| config_path().ok())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string());
            eprintln!(
                "Set EMAIL_ADDRESS, EMAIL_PASSWORD and GEMINI_API_KEY in the environment or in {location}"
            );
            return Err(e.into());
        }
    };

    let timeout = Duration::from_secs(cfg.timeout_secs);
    let generator = GeminiClient::new(
        required.api_key,
        cfg.model.clone(),
        cfg.api_base_url.clone(),
        timeout,
    )?;
    let imap = ImapClient::new(cfg.imap_server.clone(), cfg.imap_port)
        .with_timeout(timeout)
        .mark_as_read(cfg.mark_as_read);
    let pipeline = Pipeline::new(cfg, imap, generator);

    println!("🔄 Connecting to {}...", pipeline.config().imap_server);
    let mut connected = false;
    let outcome = pipeline.run_with(|event| narrate(&event, &mut connected));

    let summary = match outcome {
        Ok(RunOutcome::Completed(summary)) => summary,
        Ok(RunOutcome::NothingToDo) => {
            println!("✔ No unread emails found!");
            return Ok(());
        }
        Err(e @ Error::Connection(_)) if !connected => {
            eprintln!("❌ Failed to connect: {e}");
            eprintln!("💡 Make sure you're using an App Password, not your regular password");
            return Err(e.into());
        }
        Err(e) => {
            eprintln!("❌ {e}");
            return Err(e.into());
        }
    };

    if let Err(e) = summary.persisted {
        eprintln!("❌ {e}");
        return Err(e.into());
    }

    println!("\n✔ All summaries saved to {}", summary.output.display());
    println!(
        "✔ Processed {} email(s) successfully!",
        summary.report.len()
    );
    if summary.deferred > 0 {
        println!(
            "📊 {} unread email(s) were left for the next run",
            summary.deferred
        );
    }
    println!("\n{rule}\nDone.\n{rule}");
    Ok(())
}

fn narrate(event: &Progress<'_>, connected: &mut bool) {
    match event {
        Progress::Connected => {
            *connected = true;
            println!("✔ Connected successfully!");
            println!("🔍 Searching for unread emails...");
        }
        Progress::Found { unread, processing } => {
            println!("✔ Found {unread} unread email(s)");
            if processing < unread {
                println!(
                    "📊 Processing only the first {processing} emails (use --limit to process more)"
                );
            }
        }
        Progress::Processing { position, total } => {
            println!("\n📧 Processing email {position}/{total}...");
        }
        Progress::FetchFailed { position, error } => {
            println!("   ⚠ Warning: Could not fetch email {position}: {error}");
        }
        Progress::Parsed { subject } => {
            println!("   Subject: {}...", normalize_snippet(subject, 50));
        }
        Progress::SkippedEmpty { .. } => {
            println!("   ⚠ Warning: Empty email body, skipping...");
        }
        Progress::Summarizing { .. } => {
            println!("   🤖 Generating AI summary...");
        }
        Progress::Summarized { failed, .. } => {
            if *failed {
                println!("   ⚠ Summary generation failed, keeping placeholder");
            } else {
                println!("   ✔ Summary generated!");
            }
        }
    }
}
