//! Operator-facing output: status lines and upload progress bars.
//!
//! Everything routes through [`Reporter`] so tests can silence it.
//! Diagnostics (retries, degraded manifests) go through `tracing`
//! instead.

use crate::sync::SyncStats;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

fn verb(v: &str) -> String {
    format!("{:>12}", v)
}

#[derive(Debug, Clone)]
pub struct Reporter {
    quiet: bool,
}

impl Reporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn connected(&self, host: &str) {
        if !self.quiet {
            println!("{} {}", verb("Connected").green().bold(), host);
        }
    }

    pub fn start(&self, local: &str, remote: &str, dry_run: bool) {
        if self.quiet {
            return;
        }
        println!("{} {} -> {}", verb("Deploying").green().bold(), local, remote);
        if dry_run {
            println!(
                "{} no remote changes will be made",
                verb("DryRun").yellow().bold()
            );
        }
    }

    pub fn enter_dir(&self, remote: &str) {
        if !self.quiet {
            println!("{} {}", verb("Entering").cyan(), remote);
        }
    }

    pub fn skipping(&self, name: &str) {
        if !self.quiet {
            println!("{} {}", verb("Skipping").dimmed(), name);
        }
    }

    pub fn would_upload(&self, local: &str, remote: &str) {
        if !self.quiet {
            println!("{} {} -> {}", verb("WouldSend").yellow(), local, remote);
        }
    }

    pub fn uploaded(&self, name: &str) {
        if !self.quiet {
            println!("{} {}", verb("Uploaded").green().bold(), name);
        }
    }

    /// Byte-level progress for one transfer. Hidden when quiet, so callers
    /// can always drive it.
    pub fn upload_bar(&self, name: &str, total: u64) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:>12} [{bar:25.cyan/blue}] {percent:>3}% ({bytes}/{total_bytes})")
                .expect("valid template")
                .progress_chars("=> "),
        );
        bar.set_message(name.to_string());
        bar
    }

    pub fn finished(&self, stats: &SyncStats) {
        if self.quiet {
            return;
        }
        println!(
            "{} {} uploaded ({} bytes), {} skipped in {:.2}s",
            verb("Deployed").green().bold(),
            stats.files_uploaded,
            stats.bytes_uploaded,
            stats.files_skipped,
            stats.duration.as_secs_f64()
        );
    }
}
