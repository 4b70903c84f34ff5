use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use novus_gate_core::{auth, relay};
use novus_gate_node::config::GateConfig;
use novus_gate_node::net::{self, AuthService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Auth,
    Relay,
    Both,
}

#[derive(Debug, Parser)]
#[command(name = "gate-node", about = "Novus gateway node")]
struct Args {
    /// Config file. Relative paths are resolved against NOVUS_GATE_CONFIG_DIR,
    /// the working directory, then the workspace config/ directory.
    #[arg(long, default_value = "gate.toml")]
    config: String,

    #[arg(long, value_enum, default_value_t = Mode::Both)]
    mode: Mode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = GateConfig::load(&args.config)?;
    let store = Arc::new(config.seed_store().context("seed store")?);
    info!(
        mode = ?args.mode,
        accounts = config.accounts.len(),
        realms = config.realms.len(),
        "gate.started"
    );

    let auth_task = async {
        if args.mode == Mode::Relay {
            return Ok::<(), anyhow::Error>(());
        }
        let listener = TcpListener::bind(&config.auth.listen)
            .await
            .with_context(|| format!("bind auth listener {}", config.auth.listen))?;
        net::serve_auth(
            listener,
            AuthService {
                table: Arc::new(auth::dispatch_table()),
                store: store.clone(),
                handshake_timeout: config.auth.handshake_timeout(),
            },
        )
        .await
    };

    let relay_task = async {
        if args.mode == Mode::Auth {
            return Ok::<(), anyhow::Error>(());
        }
        net::run_relay(
            &config.relay.connect,
            Arc::new(relay::dispatch_table()),
            store.clone(),
            config.relay.settings(),
            config.relay.version,
            config.relay.build,
        )
        .await
    };

    tokio::try_join!(auth_task, relay_task)?;
    Ok(())
}
