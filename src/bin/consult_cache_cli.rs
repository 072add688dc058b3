//! consult-cache CLI: 查看与清理会诊历史记录的命令行工具
//!
//! Usage:
//!   consult-cache-cli history <session> [--limit <n>]   List a session's consultations
//!   consult-cache-cli stats                             Show history statistics
//!   consult-cache-cli suggest <session>                 Suggest regeneration prompts
//!   consult-cache-cli clear <session>|--all             Remove history entries

use anyhow::{bail, Context, Result};
use consult_cache::clock::SystemClock;
use consult_cache::history::{FileStore, HistoryEntry, HistoryStore};
use consult_cache::CoreConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIR: &str = "consult-history";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let outcome = match args[1].as_str() {
        "history" => cmd_history(&args[2..]).await,
        "stats" => cmd_stats(&args[2..]).await,
        "suggest" => cmd_suggest(&args[2..]).await,
        "clear" => cmd_clear(&args[2..]).await,
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"consult-cache-cli: 会诊历史命令行工具

USAGE:
    consult-cache-cli <COMMAND> [OPTIONS]

COMMANDS:
    history <session> [--limit <n>]   List a session's consultations, newest first
    stats                             Show history statistics
    suggest <session>                 Suggest regeneration prompts for a session
    clear <session> | --all           Remove a session's history, or all of it
    version                           Show version information
    help                              Show this help message

OPTIONS:
    --dir <path>                      History directory (default: {DEFAULT_DIR})
    --config <path>                   YAML or JSON configuration file

ENVIRONMENT:
    CONSULT_HISTORY_DIR               History directory
    CONSULT_HISTORY_MAX_ENTRIES       Overrides history.max_entries
    CONSULT_HISTORY_RETENTION_HOURS   Overrides history.retention_hours
    RUST_LOG                          Log filter (default: warn)"#
    );
}

fn cmd_version() {
    println!("consult-cache-cli {}", env!("CARGO_PKG_VERSION"));
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is neither a flag nor a flag's value.
fn positional(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = matches!(arg.as_str(), "--dir" | "--config" | "--limit");
            continue;
        }
        return Some(arg);
    }
    None
}

fn resolve_dir(args: &[String]) -> PathBuf {
    if let Some(dir) = flag_value(args, "--dir") {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("CONSULT_HISTORY_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from(DEFAULT_DIR)
}

async fn load_config(args: &[String]) -> Result<CoreConfig> {
    let config = match flag_value(args, "--config") {
        Some(path) => CoreConfig::from_file(path)
            .await
            .with_context(|| format!("loading {path}"))?,
        None => CoreConfig::default(),
    };
    Ok(config.apply_env_overrides()?)
}

async fn open_history(args: &[String]) -> Result<HistoryStore> {
    let config = load_config(args).await?;
    let dir = resolve_dir(args);
    tracing::debug!(dir = %dir.display(), "opening history");
    Ok(HistoryStore::open(config.history, Arc::new(FileStore::new(dir)), Arc::new(SystemClock)).await)
}

fn session_arg(args: &[String]) -> Result<&str> {
    match positional(args) {
        Some(session) => Ok(session),
        None => bail!("missing <session> argument"),
    }
}

async fn cmd_history(args: &[String]) -> Result<()> {
    let session = session_arg(args)?;
    let limit = flag_value(args, "--limit")
        .map(|v| v.parse::<usize>().with_context(|| format!("invalid --limit {v}")))
        .transpose()?;
    let history = open_history(args).await?;
    let entries = history.by_session(session, limit);
    if entries.is_empty() {
        println!("No history for session {session}");
        return Ok(());
    }
    for entry in &entries {
        print_entry(entry);
    }
    println!("\n{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    Ok(())
}

fn print_entry(entry: &HistoryEntry) {
    let status = if entry.is_failure() { "FAILED" } else { "ok" };
    let reason = entry.regeneration_reason.as_deref().unwrap_or("initial");
    println!("[{}] {} {} ({})", entry.timestamp_ms, entry.id, status, reason);
    if entry.has_symptoms() {
        println!("    symptoms:   {}", entry.symptoms);
    }
    let assessment = &entry.result.consultation.assessment;
    if !assessment.is_empty() {
        println!("    assessment: {}", assessment);
    }
    if let Some(failure) = &entry.failure {
        println!("    failure:    {}", failure);
    }
}

async fn cmd_stats(args: &[String]) -> Result<()> {
    let history = open_history(args).await?;
    let stats = history.statistics();
    println!("Store:                  {}", history.store_name());
    println!("Consultations:          {}", stats.total_consultations);
    println!("Regenerations:          {}", stats.regeneration_count);
    println!(
        "Avg regeneration gap:   {:.1}s",
        stats.average_regeneration_interval_ms / 1000.0
    );
    if !stats.most_common_reasons.is_empty() {
        println!("Most common reasons:");
        for rc in &stats.most_common_reasons {
            println!("    {:<24} {}", rc.reason, rc.count);
        }
    }
    Ok(())
}

async fn cmd_suggest(args: &[String]) -> Result<()> {
    let session = session_arg(args)?;
    let history = open_history(args).await?;
    let hints = history.suggest_regeneration_prompts(session);
    if hints.is_empty() {
        println!("No history for session {session}");
    }
    for hint in hints {
        println!("- {hint}");
    }
    Ok(())
}

async fn cmd_clear(args: &[String]) -> Result<()> {
    let history = open_history(args).await?;
    if args.iter().any(|a| a == "--all") {
        let count = history.len();
        history.clear_all().await;
        println!("Removed {count} entries");
        return Ok(());
    }
    let session = session_arg(args)?;
    let removed = history.clear_session(session).await;
    println!("Removed {removed} entries for session {session}");
    Ok(())
}
