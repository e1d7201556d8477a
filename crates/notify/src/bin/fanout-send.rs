//! fanout-send: dispatch one activity against a JSON data set.
//!
//! Loads users, subscriptions and integrations from `--store`, the activity
//! from `--activity`, and runs a single `send` with the providers configured
//! through the environment (see `fanout_core::config`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::info;

use fanout_core::config::{load_dotenv, Config};
use fanout_core::Activity;
use fanout_notify::{Dispatcher, InMemoryStore, NotifyServices, SendOutcome};

// ── CLI ─────────────────────────────────────────────────────────────

/// Fan an activity out to email and chat recipients.
#[derive(Parser, Debug)]
#[command(name = "fanout-send", version, about)]
struct Cli {
    /// JSON document with users, teams, subscriptions and integrations.
    #[arg(long, env = "FANOUT_STORE")]
    store: PathBuf,

    /// JSON document describing the activity to send.
    #[arg(long)]
    activity: PathBuf,

    /// Exit non-zero if any delivery unit failed.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = Config::from_env().context("invalid configuration")?;
    config.log_summary();

    let store_json = std::fs::read_to_string(&cli.store)
        .with_context(|| format!("reading store {}", cli.store.display()))?;
    let store = InMemoryStore::from_json(&store_json)?;

    let activity_json = std::fs::read_to_string(&cli.activity)
        .with_context(|| format!("reading activity {}", cli.activity.display()))?;
    let activity: Activity =
        serde_json::from_str(&activity_json).context("parsing activity JSON")?;

    let services = Arc::new(NotifyServices::from_config(&config, Arc::new(store))?);
    let dispatcher = Dispatcher::from_config(&config, services)?;

    info!(activity = activity.id, kind = %activity.kind, "sending activity notification");

    let outcome = dispatcher.send(&activity).await;
    dispatcher.flush().await;

    match outcome {
        SendOutcome::Suppressed => {
            info!(activity = activity.id, "notification suppressed");
        }
        SendOutcome::Aborted(e) => {
            anyhow::bail!("notification aborted: {e}");
        }
        SendOutcome::Dispatched(results) => {
            let failed = results.iter().filter(|r| !r.success).count();
            for result in &results {
                info!(
                    provider = %result.provider,
                    destination = %result.destination,
                    recipient = result.recipient,
                    success = result.success,
                    error = result.error.as_deref().unwrap_or(""),
                    duration_ms = result.duration_ms,
                    "delivery unit"
                );
            }
            info!(units = results.len(), failed, "dispatch complete");
            if cli.strict && failed > 0 {
                anyhow::bail!("{failed} delivery unit(s) failed");
            }
        }
    }

    Ok(())
}
