//! tree-loader - Directory Tree Metadata Loader
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tree_loader::config::{CliArgs, DestinationFormat, WalkConfig};
use tree_loader::coordinator::LoadCoordinator;
use tree_loader::progress::{print_header, print_summary, ProgressReporter};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = WalkConfig::from_args(args).context("Invalid configuration")?;

    let destination = match config.format {
        DestinationFormat::Sqlite => format!("{} (table {})", config.output.display(), config.table),
        DestinationFormat::Tsv => config.output.display().to_string(),
    };

    if config.show_progress {
        print_header(
            &config.root.display().to_string(),
            config.worker_count,
            &destination,
        );
    }

    let coordinator = LoadCoordinator::new(&config).context("Failed to initialize run")?;

    let progress = if config.show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let result = coordinator.run_with_progress(|p| {
        if let Some(ref reporter) = progress {
            reporter.update(p);
        }
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish("Load failed");
            }
            return Err(e).context("Walk and load failed");
        }
    };

    if let Some(ref p) = progress {
        p.finish_and_clear();
        print_summary(&summary);
    }

    if summary.counts.errors > 0 {
        info!(errors = summary.counts.errors, "Loaded with error rows");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("tree_loader=debug,warn")
    } else {
        EnvFilter::new("tree_loader=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
