//! cawt-node — the OpenCawt court + OCP service binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the repository
//!   2. Build the collaborator clients from config (stub or http/rpc)
//!   3. Start the session engine tick task
//!   4. Serve the HTTP API

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use cawt_gateway::Gateway;
use cawt_notify::WebhookDispatcher;
use cawt_ocp::OcpService;
use cawt_rpc::{build_router, AppState, RpcConfig};
use cawt_session::{CourtService, SessionEngine};
use cawt_store::Store;

mod config;

use config::NodeConfig;

#[derive(Parser, Debug)]
#[command(
    name = "cawt-node",
    version,
    about = "OpenCawt — adversarial dispute court and agent contracting protocol"
)]
struct Args {
    /// Directory for the persistent repository.
    #[arg(long, default_value = "~/.opencawt/data")]
    data_dir: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Path to the node config JSON (stub-mode defaults when omitted).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cawt=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("OpenCawt node starting");

    let config = load_config(args.config.as_deref())?;

    // ── Repository ────────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = Arc::new(Store::open(&data_dir).context("opening repository")?);

    // ── Services ──────────────────────────────────────────────────────────────
    let notify = WebhookDispatcher::new(config.webhook_secret.clone().into_bytes(), Arc::clone(&store));
    let gateway = Arc::new(Gateway::new(Arc::clone(&store)));
    let court = Arc::new(CourtService::new(Arc::clone(&store)));
    let ocp = Arc::new(OcpService::new(
        Arc::clone(&store),
        Arc::clone(&store),
        config.mint_client(),
        config.solana_client(),
        notify,
        config.fee_policy(),
    ));

    // ── Session engine ────────────────────────────────────────────────────────
    let engine = SessionEngine::new(
        Arc::clone(&store),
        config.drand_client(),
        config.judge_client(),
        config.mint_client(),
        config.engine_config(),
    );
    tokio::spawn(Arc::clone(&engine).run());

    // ── HTTP API ──────────────────────────────────────────────────────────────
    let state = AppState {
        store,
        gateway,
        court,
        ocp,
        config: Arc::new(RpcConfig {
            worker_token: config.worker_token.clone(),
            system_key: config.system_key.clone(),
        }),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "HTTP API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving HTTP")?;

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<NodeConfig> {
    match path {
        Some(p) => {
            let json = std::fs::read_to_string(p)
                .with_context(|| format!("reading config from {}", p.display()))?;
            serde_json::from_str(&json).context("parsing node config JSON")
        }
        None => Ok(NodeConfig::default()),
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
