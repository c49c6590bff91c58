//! bannerd: banner resolution service over PostgreSQL.
//!
//! Startup order: tracing, env file, config, pool, migrations, HTTP server.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bannerd_core::Config;
use bannerd_server::db::{self, PoolConfig};
use bannerd_server::http::{self, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "bannerd", about = "Banner resolution service")]
struct Cli {
    /// Path to the TOML config file (falls back to CONFIG_PATH)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Env file loaded before reading secrets (defaults to ./.env)
    #[arg(long)]
    env_file: Option<PathBuf>,
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().ok();
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file: {:?}", path))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config_path = cli
        .config
        .or_else(|| env::var_os("CONFIG_PATH").map(PathBuf::from))
        .context("no config path: pass --config or set CONFIG_PATH")?;
    let config = Config::load(&config_path)?;

    tracing::info!(env = %config.env, "starting bannerd");

    let password = env::var("DB_PASSWORD").context("DB_PASSWORD not set")?;
    let database_url = config.postgres.connection_url(&password);

    let pool_config = PoolConfig {
        max_open_conns: config.postgres.max_open_conns,
        min_idle_conns: config.postgres.min_idle_conns,
        max_lifetime: Duration::from_secs(config.postgres.max_lifetime_secs),
    };
    let pool = db::create_pool_with_config(&database_url, &pool_config)
        .await
        .context("failed to connect to postgres")?;

    db::migrations::run(&pool)
        .await
        .context("failed to run migrations")?;

    let bind_addr: SocketAddr = config
        .http_server
        .address
        .parse()
        .context("invalid http_server.address")?;

    let server_config = ServerConfig {
        bind_addr,
        request_timeout: Duration::from_secs(config.http_server.request_timeout_secs),
        graceful_shutdown_timeout: Duration::from_secs(
            config.http_server.graceful_shutdown_timeout_secs,
        ),
        ..Default::default()
    };
    http::run_server(pool.clone(), server_config).await?;

    pool.close().await;
    tracing::info!("bannerd stopped");
    Ok(())
}
