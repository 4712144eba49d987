//! # nodepin CLI - inspect a pinned-node store
//!
//! A debugging tool for the `obsinhibit` file of a repository. It works on
//! the file alone, without the repository index, so it cannot tell which
//! identifiers are still known; it shows and repairs the file's shape.
//!
//! ## Usage
//! ```bash
//! # List pinned identifiers in file order
//! nodepin list --store .hg/store
//!
//! # Check for duplicates and a trailing fragment (exit code 1 if found)
//! nodepin verify
//!
//! # Rewrite the file without duplicates or fragment
//! nodepin compact
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use nodepin::{AuditContext, PinConfig, PinError, PinStore, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// nodepin CLI - inspect and repair pinned-node stores
#[derive(Parser)]
#[command(name = "nodepin")]
#[command(version)]
#[command(about = "Inspect the pinned-node store of a repository")]
#[command(long_about = None)]
struct Cli {
    /// Store directory holding the pin file (defaults to .hg/store)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pinned identifiers in file order
    #[command(alias = "ls")]
    List {
        /// Print full 40-character identifiers
        #[arg(long)]
        full: bool,
    },

    /// Report records, duplicates and trailing bytes
    Verify,

    /// Drop duplicates and a trailing fragment
    Compact,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(2);
        }
    }
}

/// Run the selected command; `Ok(false)` means a check failed
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => PinConfig::load(path)?,
        None => PinConfig::default(),
    };
    let dir = cli.store.unwrap_or_else(|| PathBuf::from(".hg").join("store"));
    if !dir.is_dir() {
        return Err(PinError::InvalidConfiguration(format!(
            "store directory {:?} does not exist",
            dir
        )));
    }
    let store = PinStore::new(dir, config);

    match cli.command {
        Commands::List { full } => cmd_list(&store, full),
        Commands::Verify => cmd_verify(&store),
        Commands::Compact => cmd_compact(&store),
    }
}

fn cmd_list(store: &PinStore, full: bool) -> Result<bool> {
    let contents = store.read_raw()?;
    for node in &contents.records {
        if full {
            println!("{}", node.to_hex());
        } else {
            println!("{}", node.short());
        }
    }
    if contents.trailing_bytes > 0 {
        eprintln!(
            "{} {} trailing bytes ignored",
            "!".yellow().bold(),
            contents.trailing_bytes
        );
    }
    Ok(true)
}

fn cmd_verify(store: &PinStore) -> Result<bool> {
    let health = store.verify()?;
    println!("{}", "Store Verification".bold());
    println!("  File: {}", store.path().display());
    println!("  Records: {}", health.records);

    if health.duplicates == 0 {
        println!("  Duplicates: {}", "✓ None".green());
    } else {
        println!("  Duplicates: {}", health.duplicates.to_string().red());
    }
    if health.trailing_bytes == 0 {
        println!("  Trailing bytes: {}", "✓ None".green());
    } else {
        println!("  Trailing bytes: {}", health.trailing_bytes.to_string().red());
    }

    if health.is_well_formed() {
        println!("\n{} Store is well formed", "✓".green().bold());
    } else {
        println!(
            "\n{} Store needs compaction, run {}",
            "✗".red().bold(),
            "nodepin compact".cyan()
        );
    }
    Ok(health.is_well_formed())
}

fn cmd_compact(store: &PinStore) -> Result<bool> {
    let args = std::env::args_os().map(|arg| arg.to_string_lossy().into_owned());
    let report = store.compact(None, &AuditContext::new(args))?;
    println!(
        "{} Compacted {}: {} records kept, {} dropped",
        "✓".green().bold(),
        store.path().display(),
        report.after.len(),
        report.before.len() - report.after.len()
    );
    if !report.changed() {
        println!("  pinned records unchanged");
    }
    Ok(true)
}
