//! coinworks API server. Serves the ledger over HTTP, backed by Redis or,
//! when no Redis URL is given, an in-memory store that forgets on restart.

mod routes;
mod websim;

use anyhow::Result;
use clap::Parser;
use coinworks_ledger::{Ledger, Memory, RedisStore, Store, VipUpkeep};
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use websim::PlatformClient;

#[derive(Parser, Debug)]
#[command(name = "coinworks-api", about = "HTTP service exposing the coinworks ledger")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Redis connection URL. Omit to run on the volatile in-memory store.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Bearer token that elevates a session to the admin role.
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: String,

    /// Base URL of the hosting platform's API.
    #[arg(long, default_value = "https://websim.com")]
    platform_url: String,

    /// Project whose tip-comment feed backs tip redemption.
    #[arg(long)]
    project_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let platform = Arc::new(PlatformClient::new(&args.platform_url, &args.project_id));

    match &args.redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            info!(listen = %args.listen, "serving with redis-backed store");
            serve(store, platform, &args).await
        }
        None => {
            info!(listen = %args.listen, "serving with in-memory store; state is volatile");
            serve(Memory::default(), platform, &args).await
        }
    }
}

async fn serve<S: Store + Send + Sync + 'static>(
    store: S,
    platform: Arc<PlatformClient>,
    args: &Args,
) -> Result<()> {
    let ledger = Arc::new(Ledger::new(store));
    let upkeep = Arc::new(VipUpkeep::new(ledger.clone()));
    let state = AppState {
        ledger,
        upkeep: upkeep.clone(),
        platform,
        admin_token: Arc::from(args.admin_token.as_str()),
    };

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    upkeep.shutdown();
    Ok(())
}
