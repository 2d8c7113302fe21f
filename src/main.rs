//! apidiff CLI

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use apidiff::compare::{wait_for_path, Comparator};
use apidiff::config::Config;
use apidiff::manifest::Manifest;
use apidiff::recording::{Recorder, SessionStore};

/// Environment variable naming a TOML configuration file
const CONFIG_ENV: &str = "APIDIFF_CONFIG";

fn usage() {
    eprintln!("apidiff v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: apidiff <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list                        List recorded sessions");
    eprintln!("  show <session>              Show the interactions of a session");
    eprintln!("  detail <session> <n>        Show the n-th interaction in full");
    eprintln!("  delete <session>            Delete a session");
    eprintln!("  record <session> <manifest> Record a manifest into a session");
    eprintln!("  compare <session> <manifest> Compare a manifest against a session");
    eprintln!();
    eprintln!("Configuration is read from ${CONFIG_ENV} when set.");
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("apidiff=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
        return Ok(ExitCode::FAILURE);
    }

    let config = load_config()?;
    let store = SessionStore::new(
        config.storage_dir.clone(),
        Recorder::new(&config.http).context("Failed to build HTTP client")?,
    );

    let command = args[1].as_str();
    let operands = &args[2..];

    match (command, operands) {
        ("list", []) => list(&store)?,
        ("show", [name]) => show(&store, name)?,
        ("detail", [name, index]) => {
            let index: usize = index
                .parse()
                .with_context(|| format!("Invalid interaction index '{index}'"))?;
            detail(&store, name, index)?;
        }
        ("delete", [name]) => {
            store.delete(name)?;
            println!("Deleted session '{name}'");
        }
        ("record", [name, manifest]) => {
            config.ensure_storage_dir()?;
            record(&store, &config, name, Path::new(manifest)).await?;
        }
        ("compare", [name, manifest]) => {
            let changed = compare(&store, &config, name, Path::new(manifest)).await?;
            if changed {
                return Ok(ExitCode::FAILURE);
            }
        }
        _ => {
            eprintln!("Unknown command or wrong arguments: {}", args[1..].join(" "));
            eprintln!("Run 'apidiff' for usage information.");
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config() -> anyhow::Result<Config> {
    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn list(store: &SessionStore) -> anyhow::Result<()> {
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No sessions in {}", store.root().display());
        return Ok(());
    }

    for session in sessions {
        println!(
            "{:<32} {:>4} interaction(s)  created {}",
            session.name,
            session.interactions.len(),
            session.created_display()
        );
    }
    Ok(())
}

fn show(store: &SessionStore, name: &str) -> anyhow::Result<()> {
    let session = store.show(name)?;
    println!("Session: {} ({})", session.name, session.storage_path.display());
    println!();

    for (i, interaction) in session.interactions.iter().enumerate() {
        println!(
            "{:>3}  {:<7} {:<60} {:>3}  {:>6} ms",
            i + 1,
            interaction.method,
            interaction.url,
            interaction.status_code,
            interaction.stats.duration()
        );
    }
    Ok(())
}

fn detail(store: &SessionStore, name: &str, index: usize) -> anyhow::Result<()> {
    let (interaction, stats) = store.detail(name, index)?;

    print!("{}", serde_yaml::to_string(&interaction)?);
    println!();
    println!("DNS lookup:        {} ms", stats.dns_lookup);
    println!("TCP connection:    {} ms", stats.tcp_connection);
    println!("TLS handshake:     {} ms", stats.tls_handshake);
    println!("Server processing: {} ms", stats.server_processing);
    println!("Content transfer:  {} ms", stats.content_transfer);
    println!("Total:             {} ms", stats.duration());
    Ok(())
}

async fn record(
    store: &SessionStore,
    config: &Config,
    name: &str,
    manifest_path: &Path,
) -> anyhow::Result<()> {
    let manifest = Manifest::from_file(manifest_path)?;
    if manifest.interactions.is_empty() {
        bail!("Manifest {} declares no interaction", manifest_path.display());
    }

    let mut paths = Vec::with_capacity(manifest.interactions.len());
    for interaction in &manifest.interactions {
        let path = store
            .record(name, interaction, &manifest.request, &manifest.matching_rules)
            .await
            .with_context(|| format!("Recording {} {}", interaction.method, interaction.url))?;
        paths.push(path);
    }

    for path in &paths {
        wait_for_path(path, &config.persistence).await?;
    }

    println!(
        "Recorded {} interaction(s) into session '{name}'",
        paths.len()
    );
    Ok(())
}

async fn compare(
    store: &SessionStore,
    config: &Config,
    name: &str,
    manifest_path: &Path,
) -> anyhow::Result<bool> {
    let manifest = Manifest::from_file(manifest_path)?;
    let session = store.show(name)?;

    let comparator = Comparator::new(store.recorder(), config.persistence, config.diff);
    let results = comparator.compare(&session, &manifest).await?;

    let mut any_changed = false;
    for (index, differences) in &results {
        if !differences.changed {
            println!("[{index}] {} unchanged", differences.url);
            continue;
        }

        any_changed = true;
        println!("[{index}] {} CHANGED", differences.url);
        for (header, problem) in &differences.headers {
            println!("    header {header}: {problem}");
        }
        for (category, delta) in &differences.body {
            println!("    {category}:");
            for line in delta.lines() {
                println!("      {line}");
            }
        }
    }

    if results.is_empty() {
        println!("Nothing to compare: session '{name}' has no counterpart interactions");
    }
    Ok(any_changed)
}
