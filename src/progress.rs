//! Progress reporting for walk-and-load runs
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::coordinator::RunSummary;
use crate::walker::WalkProgress;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays run status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &WalkProgress) {
        let msg = format!(
            "Visited: {} | Records: {} | Errors: {} | Streamed: {} | Rate: {:.0}/s | Workers: {}",
            format_number(progress.counts.visited),
            format_number(progress.counts.records),
            format_number(progress.counts.errors),
            format_size(progress.bytes_streamed, BINARY),
            progress.records_per_second(),
            progress.total_workers,
        );

        self.bar.set_message(msg);
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of a finished run
pub fn print_summary(summary: &RunSummary) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.load.rows_loaded as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Load Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), summary.root.display());
    println!(
        "  {} {}",
        style("Rows loaded:").bold(),
        format_number(summary.load.rows_loaded)
    );
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(summary.counts.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} rows/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.counts.errors > 0 {
        println!(
            "  {} {}",
            style("Error rows:").yellow().bold(),
            format_number(summary.counts.errors)
        );
    }
    if summary.load.rows_rejected > 0 {
        println!(
            "  {} {}",
            style("Rejected:").yellow().bold(),
            format_number(summary.load.rows_rejected)
        );
        for rejected in &summary.load.rejections {
            println!("    row {}: {}", rejected.row, style(&rejected.reason).dim());
        }
    }
    println!("  {} {}", style("Destination:").bold(), summary.load.destination);
    println!();
}

/// Print a header at the start of the run
pub fn print_header(root: &str, workers: usize, destination: &str) {
    println!();
    println!(
        "{} {}",
        style("tree-loader").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Destination:").bold(), destination);
    println!();
}
