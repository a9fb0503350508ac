//! Airkeeper invocation entrypoint.
//!
//! Two ways to run:
//! - As a Lambda handler (default): `lambda_runtime` drives one cycle per scheduled
//!   invocation event, matching how Airnode-style keepers are typically deployed (spec §1
//!   "periodically invoked ... once per minute").
//! - Locally with `--once`: runs a single cycle against config files on disk, waits for it
//!   to finish (or a shutdown signal), and exits — for manual runs and smoke tests.
//!
//! Config is two JSON documents on disk, merged by [`config::Config::merge`]: a node config
//! (chains, OIS, RRP triggers, mnemonic) and a keeper config (chain overrides, PSP
//! subscriptions). Loading and schema-validating these documents is otherwise out of scope
//! (spec §1) — this binary only reads the files and hands the parsed values to `merge`.

mod api_caller;
mod condition;
mod config;
mod contracts;
mod cycle;
mod error;
mod http_adapter;
mod model;
mod ois;
mod providers;
mod retry;
mod sig_down;
mod sponsor;
mod submit;
mod telemetry;
mod triggers;
mod wallet;

use clap::Parser;
use lambda_runtime::{service_fn, Error as LambdaError, LambdaEvent};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, KeeperConfig, NodeConfig};
use crate::cycle::DEFAULT_CYCLE_DEADLINE;
use crate::error::KeeperError;
use crate::sig_down::SigDown;

#[derive(Parser, Debug)]
#[command(name = "airkeeper", version, about = "Oracle beacon-update keeper")]
struct Cli {
    /// Run a single cycle locally and exit, instead of starting the Lambda runtime.
    #[arg(long)]
    once: bool,

    /// Path to the node config document (chains, OIS, RRP triggers, mnemonic).
    #[arg(long, env = "AIRKEEPER_NODE_CONFIG", default_value = "config/config.json")]
    node_config: PathBuf,

    /// Path to the keeper config document (PSP subscriptions, chain overrides).
    #[arg(long, env = "AIRKEEPER_KEEPER_CONFIG", default_value = "config/keeper.json")]
    keeper_config: PathBuf,
}

fn load_config(node_path: &PathBuf, keeper_path: &PathBuf) -> Result<Config, KeeperError> {
    let node_raw = std::fs::read_to_string(node_path)?;
    let keeper_raw = std::fs::read_to_string(keeper_path)?;
    let node: NodeConfig = serde_json::from_str(&node_raw)?;
    let keeper: KeeperConfig = serde_json::from_str(&keeper_raw)?;
    Config::merge(node, keeper).map_err(KeeperError::from)
}

/// Builds the invocation surface's `{statusCode, body}` response, with `body` itself a
/// JSON-encoded string per the Lambda proxy-integration convention the runtime expects.
fn invocation_response(message: &str) -> serde_json::Value {
    let body = serde_json::json!({
        "ok": true,
        "data": { "message": message },
    });
    serde_json::json!({
        "statusCode": 200,
        "body": body.to_string(),
    })
}

/// Runs one cycle per invocation event, ignoring the event body — a scheduled trigger (e.g.
/// EventBridge) carries no per-invocation input this keeper needs (spec §1).
async fn handler(
    _event: LambdaEvent<serde_json::Value>,
    config: Arc<Config>,
) -> Result<serde_json::Value, LambdaError> {
    let summary = cycle::run_cycle(&config, DEFAULT_CYCLE_DEADLINE).await;
    tracing::info!(?summary, "cycle complete");
    Ok(invocation_response("PSP beacon update execution has finished"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let _telemetry = telemetry::Telemetry::init();

    let cli = Cli::parse();
    let config = load_config(&cli.node_config, &cli.keeper_config)?;

    if cli.once {
        let sig_down = SigDown::try_new()?;
        let cancellation = sig_down.cancellation_token();
        tokio::select! {
            summary = cycle::run_cycle(&config, DEFAULT_CYCLE_DEADLINE) => {
                tracing::info!(?summary, "cycle complete");
            }
            _ = cancellation.cancelled() => {
                tracing::warn!("shutdown signal received before cycle completed");
            }
        }
        return Ok(());
    }

    let config = Arc::new(config);
    lambda_runtime::run(service_fn(move |event| {
        let config = config.clone();
        async move { handler(event, config).await }
    }))
    .await?;

    Ok(())
}
