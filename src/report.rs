use std::path::Path;

use chrono::{DateTime, Local};

use crate::domain::email::SummaryResult;
use crate::error::{Error, Result};

/// Summaries in fetch order plus the time the run started.
#[derive(Debug, Clone)]
pub struct Report {
    generated_at: DateTime<Local>,
    entries: Vec<SummaryResult>,
}

impl Report {
    pub fn new(generated_at: DateTime<Local>) -> Self {
        Self {
            generated_at,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: SummaryResult) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SummaryResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generated_at(&self) -> DateTime<Local> {
        self.generated_at
    }

    pub fn render(&self) -> String {
        let mut content = String::from("# Email Summaries\n\n");
        content.push_str(&format!(
            "Generated on: {}\n\n---\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        // numbered among emitted entries, skipped messages leave no gap
        for (n, entry) in self.entries.iter().enumerate() {
            content.push_str(&format!("## Email {}\n\n", n + 1));
            content.push_str(&format!("**From:** {}\n", entry.sender));
            content.push_str(&format!("**Date:** {}\n", entry.date));
            content.push_str(&format!("**Subject:** {}\n\n", entry.subject));
            content.push_str(&format!("**Summary:**\n{}\n\n---\n\n", entry.summary));
        }

        content
    }

    /// Write the rendered report in one call, replacing any previous file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).map_err(|source| Error::Persist {
            path: path.to_path_buf(),
            source,
        })
    }
}
