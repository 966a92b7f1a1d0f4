// Report attachments for a finished crawl

use crate::crawl::CrawlOutcome;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// A named report body, written as one file per attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content_type: &'static str,
    pub body: String,
}

impl Attachment {
    fn text(name: &str, body: String) -> Self {
        Self {
            name: name.to_string(),
            content_type: "text/plain",
            body,
        }
    }

    pub fn file_name(&self) -> String {
        let extension = match self.content_type {
            "application/json" => "json",
            _ => "txt",
        };
        format!("{}.{}", self.name, extension)
    }
}

fn summary_lines(outcome: &CrawlOutcome) -> Vec<String> {
    vec![
        format!("Visited: {}", outcome.visited.len()),
        format!("Discovered: {}", outcome.discovered),
        format!("Failures: {}", outcome.failures.len()),
    ]
}

/// One-line verdict, e.g. `Visited: 42 | Discovered: 57 | Failures: 0`.
pub fn summary_line(outcome: &CrawlOutcome) -> String {
    summary_lines(outcome).join(" | ")
}

pub fn category_breakdown(outcome: &CrawlOutcome) -> String {
    outcome
        .category_counts
        .iter()
        .map(|(category, count)| format!("{}:{}", category, count))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn generate_summary(outcome: &CrawlOutcome) -> String {
    let metrics = &outcome.metrics;
    let mut lines = vec![
        format!("Session: {}", outcome.session_id),
        format!(
            "Started: {}",
            outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!(
            "Finished: {}",
            outcome.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("Routes visited: {}", outcome.visited.len()),
        format!("Routes discovered: {}", outcome.discovered),
        format!("Categories: {}", category_breakdown(outcome)),
        format!(
            "Elements: {} buttons, {} inputs, {} links, {} images, {} headings",
            metrics.buttons, metrics.inputs, metrics.links, metrics.images, metrics.headings
        ),
        format!("Failures: {}", outcome.failures.len()),
    ];
    if outcome.timed_out {
        lines.push("Timed out: run deadline reached before the queue drained".to_string());
    }
    lines.join("\n")
}

pub fn generate_external_links(outcome: &CrawlOutcome) -> Option<String> {
    if outcome.external_links.is_empty() {
        return None;
    }
    Some(
        outcome
            .external_links
            .iter()
            .map(|entry| format!("- {}: {}", entry.route, entry.links.join(", ")))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

pub fn generate_failures(outcome: &CrawlOutcome) -> Option<String> {
    if outcome.failures.is_empty() {
        return None;
    }

    let mut report = summary_lines(outcome).join("\n");
    for failure in &outcome.failures {
        report.push('\n');
        report.push_str(&format!("- {} (status: {})", failure.route, failure.status));
        for err in failure.errors.iter().chain(failure.console_errors.iter()) {
            report.push_str(&format!("\n  {}", err));
        }
    }
    Some(report)
}

/// Build the attachments for `outcome` in the requested format.
pub fn build_attachments(
    outcome: &CrawlOutcome,
    format: ReportFormat,
) -> serde_json::Result<Vec<Attachment>> {
    match format {
        ReportFormat::Json => Ok(vec![Attachment {
            name: "crawl-report".to_string(),
            content_type: "application/json",
            body: serde_json::to_string_pretty(outcome)?,
        }]),
        ReportFormat::Text => {
            let mut attachments = vec![Attachment::text("crawl-summary", generate_summary(outcome))];
            if let Some(body) = generate_external_links(outcome) {
                attachments.push(Attachment::text("external-links", body));
            }
            if let Some(body) = generate_failures(outcome) {
                attachments.push(Attachment::text("crawl-failures", body));
            }
            Ok(attachments)
        }
    }
}

/// Write each attachment to `dir`, creating it if needed.
pub fn write_attachments(dir: &Path, attachments: &[Attachment]) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    attachments
        .iter()
        .map(|attachment| {
            let path = dir.join(attachment.file_name());
            fs::write(&path, &attachment.body)?;
            Ok(path)
        })
        .collect()
}
