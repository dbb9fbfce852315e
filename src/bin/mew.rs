//! # mew CLI - snap and wind
//!
//! A thin command-line shell over the mew library.
//!
//! ## Usage
//! ```bash
//! # Create the metadata directory
//! mew init
//!
//! # Capture the current directory
//! mew snap "before refactor"
//!
//! # List snapshots, newest first
//! mew list
//!
//! # Wind the directory back (identity, title or identity prefix)
//! mew wind abc1
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use mew::utils::format_bytes;
use mew::{EntryHeader, EntryKind, Mew, MewBuilder, MewError, ResolveMode, VerificationReport};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// mew - local-first immutable snapshots
#[derive(Parser)]
#[command(name = "mew")]
#[command(version)]
#[command(about = "Capture a directory into an immutable snapshot and wind it back later")]
#[command(long_about = None)]
struct Cli {
    /// Directory to operate on (defaults to current)
    #[arg(short = 'C', long, global = true)]
    path: Option<PathBuf>,

    /// Metadata directory (defaults to <path>/.mew)
    #[arg(long, global = true)]
    metadata: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the metadata directory
    Init {
        /// Overwrite an existing index
        #[arg(short, long)]
        force: bool,
    },

    /// Capture the directory as a new snapshot
    Snap {
        /// Snapshot title
        title: String,

        /// Additional exclude patterns
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Restore files from a snapshot (overlay, nothing is deleted)
    Wind {
        /// Identity, title or identity prefix
        #[arg(value_parser = parse_key)]
        key: String,

        /// Fail instead of picking the newest of several matches
        #[arg(long)]
        strict: bool,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// List snapshots
    #[command(alias = "ls")]
    List {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,

        /// Limit results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one snapshot and its entries
    Show {
        /// Identity, title or identity prefix
        #[arg(value_parser = parse_key)]
        key: String,
    },

    /// Verify snapshot integrity
    Verify {
        /// Snapshot to verify
        #[arg(value_parser = parse_key)]
        key: Option<String>,

        /// Verify all snapshots
        #[arg(long)]
        all: bool,
    },

    /// Remove a snapshot and its archive
    Rm {
        /// Identity, title or identity prefix
        #[arg(value_parser = parse_key)]
        key: String,
    },

    /// Delete archives no snapshot references
    Gc {
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("MEW_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<MewError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Reject empty or blank snapshot keys
fn parse_key(key: &str) -> Result<String, String> {
    if key.trim().is_empty() {
        return Err("snapshot key must not be empty".to_string());
    }
    Ok(key.to_string())
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let root_path = cli.path.unwrap_or_else(|| PathBuf::from("."));
    let builder = match cli.metadata {
        Some(metadata) => MewBuilder::new().metadata_path(metadata),
        None => MewBuilder::new(),
    };

    match cli.command {
        Commands::Init { force } => cmd_init(builder.build(&root_path)?, force),
        Commands::Snap { title, exclude, progress } => {
            cmd_snap(builder.exclude_patterns(exclude).build(&root_path)?, &title, progress)
        }
        Commands::Wind { key, strict, progress } => {
            let mode = if strict { ResolveMode::Strict } else { ResolveMode::FirstMatch };
            cmd_wind(builder.resolve_mode(mode).build(&root_path)?, &key, progress)
        }
        Commands::List { detailed, limit } => cmd_list(builder.build(&root_path)?, detailed, limit),
        Commands::Show { key } => cmd_show(builder.build(&root_path)?, &key),
        Commands::Verify { key, all } => cmd_verify(builder.build(&root_path)?, key, all),
        Commands::Rm { key } => cmd_rm(builder.build(&root_path)?, &key),
        Commands::Gc { dry_run } => cmd_gc(builder.build(&root_path)?, dry_run),
    }
}

fn cmd_init(mew: Mew, force: bool) -> anyhow::Result<()> {
    mew.init(force)?;

    println!("{} Initialized {}", "✓".green().bold(), mew.config().metadata_path.display().to_string().cyan());
    println!("\nNext steps:");
    println!("  - Capture the directory: {}", "mew snap \"first\"".yellow());
    Ok(())
}

fn cmd_snap(mew: Mew, title: &str, show_progress: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let progress = spinner(show_progress, "Capturing...");

    let snapshot = mew.capture_with_progress(title, |header| tick(&progress, header))?;
    progress.finish_and_clear();

    println!("{} Captured {}", "✓".green().bold(), snapshot.id.yellow().bold());
    println!("  Title: {}", snapshot.title.cyan());
    println!(
        "  Entries: {} ({} files, {} dirs, {} links)",
        snapshot.stats.entries().to_string().cyan(),
        snapshot.stats.files,
        snapshot.stats.directories,
        snapshot.stats.symlinks
    );
    println!(
        "  Size: {} -> {}",
        format_bytes(snapshot.stats.total_size).cyan(),
        format_bytes(snapshot.stats.archive_size).cyan()
    );
    println!("  Time: {}", format_duration(trim_millis(start.elapsed())).to_string().cyan());
    Ok(())
}

fn cmd_wind(mew: Mew, key: &str, show_progress: bool) -> anyhow::Result<()> {
    let snapshot = mew.resolve(key)?;
    println!(
        "{} {} {}",
        "Winding back to".blue().bold(),
        snapshot.id.yellow(),
        snapshot.title.cyan()
    );

    let progress = spinner(show_progress, "Restoring...");
    let result = mew.restore_snapshot(&snapshot, |header| tick(&progress, header))?;
    progress.finish_and_clear();

    println!("{} Restore complete", "✓".green().bold());
    println!("  Files restored: {}", result.files_restored.to_string().green());
    if result.directories_created > 0 {
        println!("  Directories created: {}", result.directories_created.to_string().green());
    }
    if result.symlinks_restored > 0 {
        println!("  Links restored: {}", result.symlinks_restored.to_string().green());
    }
    if !result.skipped.is_empty() {
        println!("  Reserved entries skipped: {}", result.skipped.len().to_string().yellow());
    }
    println!("  Bytes written: {}", format_bytes(result.bytes_written).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(result.duration_ms)).to_string().cyan()
    );
    Ok(())
}

fn cmd_list(mew: Mew, detailed: bool, limit: Option<usize>) -> anyhow::Result<()> {
    let snapshots = mew.list()?;

    if snapshots.is_empty() {
        println!("{}", "No snapshots found.".yellow());
        return Ok(());
    }

    let display_count = limit.unwrap_or(snapshots.len()).min(snapshots.len());
    for snapshot in snapshots.iter().take(display_count) {
        println!(
            "{}  {}  {}",
            snapshot.id.yellow().bold(),
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            snapshot.title.cyan()
        );

        if detailed {
            println!(
                "    Files: {} | Size: {} | Archive: {}",
                snapshot.stats.files.to_string().dimmed(),
                format_bytes(snapshot.stats.total_size).dimmed(),
                format_bytes(snapshot.stats.archive_size).dimmed()
            );
            if let Some(host) = &snapshot.hostname {
                println!("    Host: {}", host.dimmed());
            }
            println!();
        }
    }

    if display_count < snapshots.len() {
        println!(
            "\n{}",
            format!("Showing {} of {} snapshots", display_count, snapshots.len()).dimmed()
        );
    }
    Ok(())
}

fn cmd_show(mew: Mew, key: &str) -> anyhow::Result<()> {
    let snapshot = mew.resolve(key)?;

    println!("{} {}", "Snapshot".blue().bold(), snapshot.id.yellow().bold());
    println!();
    println!("  Title: {}", snapshot.title.cyan());
    println!("  Created: {}", snapshot.timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC"));
    println!("  Archive: {}", mew.config().archive_location(&snapshot.archive).display());
    if let Some(host) = &snapshot.hostname {
        println!("  Host: {}", host);
    }
    if let Some(version) = &snapshot.tool_version {
        println!("  mew version: {}", version);
    }

    println!("\n{}", "Entries:".bold());
    for header in mew.entries(&snapshot.id).with_context(|| format!("reading archive of {}", snapshot.id))? {
        println!("  {}", describe_entry(&header));
    }
    Ok(())
}

fn cmd_verify(mew: Mew, key: Option<String>, verify_all: bool) -> anyhow::Result<()> {
    let reports = match (key, verify_all) {
        (_, true) => {
            println!("{}", "Verifying all snapshots...".blue().bold());
            mew.verify_all()?
        }
        (Some(key), false) => vec![mew.verify(&key)?],
        (None, false) => bail!("specify a snapshot or --all"),
    };

    let mut invalid = 0;
    for report in &reports {
        print_report(report);
        if !report.is_valid() {
            invalid += 1;
        }
    }

    if reports.len() > 1 {
        println!(
            "\n  Valid: {}  Invalid: {}",
            (reports.len() - invalid).to_string().green(),
            invalid.to_string().red()
        );
    }
    if invalid > 0 {
        bail!("{} snapshot(s) failed verification", invalid);
    }
    Ok(())
}

fn cmd_rm(mew: Mew, key: &str) -> anyhow::Result<()> {
    let snapshot = mew.remove(key)?;
    println!("{} Removed {} {}", "✓".green().bold(), snapshot.id.yellow(), snapshot.title.cyan());
    Ok(())
}

fn cmd_gc(mew: Mew, dry_run: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let stats = mew.gc(dry_run)?;

    if dry_run {
        println!("{}", "Garbage collection (dry run)".blue().bold());
    } else {
        println!("{} Garbage collection complete", "✓".green().bold());
    }
    println!("  Unreferenced archives: {}", stats.archives_removed.to_string().yellow());
    println!("  Stale temporary files: {}", stats.temp_files_removed.to_string().yellow());
    println!("  Space reclaimed: {}", format_bytes(stats.bytes_reclaimed).green());

    for path in stats.removed.iter().take(10) {
        println!("  - {}", path.display().to_string().dimmed());
    }
    if stats.removed.len() > 10 {
        println!("  ... and {} more", (stats.removed.len() - 10).to_string().dimmed());
    }
    if dry_run {
        println!("\n{}", "No changes made (dry run)".dimmed());
    }
    println!("\n{}", format!("Total time: {}", format_duration(trim_millis(start.elapsed()))).dimmed());
    Ok(())
}

// Helper functions

fn print_report(report: &VerificationReport) {
    if report.is_valid() {
        println!("{} {}", "✓".green().bold(), report.summary());
    } else {
        println!("{} {}", "✗".red().bold(), report.summary());
        for error in &report.errors {
            println!("    {}", error.red());
        }
    }
}

fn describe_entry(header: &EntryHeader) -> String {
    match header.kind {
        EntryKind::File => format!(
            "{:<4} {:o} {:>10}  {}",
            header.kind,
            header.mode,
            format_bytes(header.size),
            header.path.display()
        ),
        EntryKind::Directory => format!("{:<4} {:o} {:>10}  {}/", header.kind, header.mode, "", header.path.display()),
        EntryKind::Symlink => format!(
            "{:<4} {:>14}  {} -> {}",
            header.kind,
            "",
            header.path.display(),
            header
                .link_target
                .as_deref()
                .map(|t| t.display().to_string())
                .unwrap_or_default()
        ),
    }
}

fn spinner(enabled: bool, message: &'static str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {pos} entries {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn tick(progress: &ProgressBar, header: &EntryHeader) {
    progress.inc(1);
    progress.set_message(header.path.display().to_string());
}

fn trim_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
