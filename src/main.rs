use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedrelay::config::Config;
use feedrelay::engine::{Engine, FeedOutcome};
use feedrelay::feed::HttpFeedSource;
use feedrelay::notify::DiscordNotifier;
use feedrelay::storage::SqliteStore;
use feedrelay::transport::TransportClient;

/// Get the config directory path (~/.config/feedrelay/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedrelay"))
}

/// Create the directory holding the checkpoint database if needed, user-only on Unix.
fn ensure_state_dir(db_path: &Path) -> Result<()> {
    let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
        return Ok(());
    };
    if dir.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create state directory '{}'", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set state directory permissions to 0700"
            );
        }
    }
    Ok(())
}

/// Resolve the checkpoint database path and create its directory.
///
/// A run needs a complete configuration, so it is validated before anything
/// touches the filesystem. `--print-state` only reads the store and skips that.
fn prepare_state_db(args: &Args, config: &Config, config_dir: &Path) -> Result<PathBuf> {
    if !args.print_state {
        config.validate().context("Configuration is incomplete")?;
    }
    let db_path = config.state_db_path(config_dir);
    ensure_state_dir(&db_path)?;
    Ok(db_path)
}

#[derive(Parser, Debug)]
#[command(
    name = "feedrelay",
    version,
    about = "Relay new RSS/Atom items to a Discord webhook"
)]
struct Args {
    /// Config file (default: ~/.config/feedrelay/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Checkpoint database, overrides `state_db` and STATE_DB_PATH
    #[arg(long, value_name = "FILE")]
    state_db: Option<PathBuf>,

    /// Print the stored checkpoint document and exit
    #[arg(long)]
    print_state: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(path) = &args.state_db {
        config.state_db = Some(path.clone());
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let db_path = prepare_state_db(&args, &config, config_dir)?;
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = SqliteStore::open(db_path_str, config.state_key.clone())
        .await
        .with_context(|| format!("Failed to open checkpoint database '{}'", db_path.display()))?;

    if args.print_state {
        match store.load_raw().await.context("Failed to read checkpoint")? {
            Some(document) => println!("{document}"),
            None => eprintln!("No checkpoint stored under key '{}'", store.key()),
        }
        return Ok(());
    }

    tracing::debug!(config = ?config, "Effective configuration");

    let webhook = config
        .webhook_secret()
        .ok_or_else(|| anyhow::anyhow!("webhook URL missing"))?;
    let transport = TransportClient::new(config.http.retry_policy());

    let mut notifier =
        DiscordNotifier::new(transport.clone(), webhook).with_options(config.discord_options());
    if let Some(url) = config.error_webhook_secret() {
        notifier = notifier.with_error_webhook(url);
    }

    let engine = Engine::new(
        Arc::new(store),
        Arc::new(HttpFeedSource::new(transport)),
        Arc::new(notifier),
        config.engine_options(),
    );

    let report = engine.run(&config.feeds).await.context("Run failed")?;

    for (feed, outcome) in &report.feeds {
        match outcome {
            FeedOutcome::FetchFailed { reason } | FeedOutcome::DeliveryFailed { reason } => {
                eprintln!("  {feed}: {reason}");
            }
            FeedOutcome::Delivered { count, deferred, .. } if *deferred > 0 => {
                println!("  {feed}: {count} delivered, {deferred} deferred");
            }
            FeedOutcome::Delivered { count, .. } => println!("  {feed}: {count} delivered"),
            FeedOutcome::UpToDate => {}
        }
    }
    println!(
        "Processed {} feeds: {} items delivered, {} feeds failed",
        report.feeds.len(),
        report.delivered_count(),
        report.failed_count()
    );

    Ok(())
}
