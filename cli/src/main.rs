//! chainpool CLI: inspect endpoint pools and probe RPC providers.
//!
//! Endpoints come from the same variables the library reads:
//! ```bash
//! export PROVIDER_URL_MAINNET=https://eth.llamarpc.com
//! export PROVIDER_URL_MAINNET_1=https://cloudflare-eth.com
//!
//! chainpool endpoints --network mainnet
//! chainpool call --network mainnet --method eth_getBalance \
//!     --params '["0xd8da6bf26964af9d7eed9e03e53415d37aa96045", "latest"]'
//! chainpool probe --network mainnet
//! ```

use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainpool_core::{ChainRegistry, Param, ResultKind, RpcCall};

#[derive(Parser)]
#[command(
    name = "chainpool",
    about = "Resilient multi-provider JSON-RPC client",
    long_about = "
chainpool: read EVM chain state through a pool of interchangeable providers.

ENVIRONMENT VARIABLES:
  PROVIDER_URL_<NETWORK>        primary endpoint (e.g. PROVIDER_URL_MAINNET)
  PROVIDER_URL_<NETWORK>_1, _2  fallback endpoints
  CHAINPOOL_MAX_RETRIES         attempts per endpoint (default 3)
  CHAINPOOL_BACKOFF_MS          base backoff in ms (default 100)
  CHAINPOOL_MAX_BACKOFF_MS      backoff cap in ms, 0 = uncapped (default 30000)
  CHAINPOOL_TIMEOUT_MS          per-request timeout in ms (default 30000)
  CHAINPOOL_ROTATION            sticky | reset-on-success
  CHAINPOOL_DECODE              collect | fail-fast
",
    version
)]
struct Cli {
    /// Log filter directive, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured endpoints of a network
    Endpoints {
        #[arg(short, long)]
        network: String,
    },

    /// Send one read call through the pool
    Call {
        #[arg(short, long)]
        network: String,
        /// JSON-RPC method, e.g. eth_getBalance
        #[arg(short, long)]
        method: String,
        /// Parameters as a JSON array
        #[arg(long, default_value = "[]")]
        params: String,
        /// How to decode the result: quantity | data | bool | json
        #[arg(long, default_value = "json")]
        expect: String,
        /// Send only to the endpoint at this index, without failover
        #[arg(long)]
        pin: Option<usize>,
    },

    /// Query the head block on every endpoint concurrently
    Probe {
        #[arg(short, long)]
        network: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let registry = chainpool_http::registry_from_env().context("loading configuration")?;
    tracing::debug!(config = ?registry.config(), "registry ready");

    match cli.command {
        Commands::Endpoints { network } => cmd_endpoints(&registry, &network),
        Commands::Call {
            network,
            method,
            params,
            expect,
            pin,
        } => cmd_call(&registry, &network, method, &params, &expect, pin).await,
        Commands::Probe { network } => cmd_probe(&registry, &network).await,
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn cmd_endpoints(registry: &ChainRegistry, network: &str) -> Result<()> {
    let client = registry.get(network)?;
    let pool = client.pool();

    println!("Network: {}", pool.network());
    for endpoint in pool.snapshot() {
        let marker = if endpoint.index() == pool.current_index() { "*" } else { " " };
        println!(
            " {marker} [{}] {}  failures={}",
            endpoint.index(),
            endpoint.redacted(),
            endpoint.consecutive_failures()
        );
    }
    Ok(())
}

async fn cmd_call(
    registry: &ChainRegistry,
    network: &str,
    method: String,
    params: &str,
    expect: &str,
    pin: Option<usize>,
) -> Result<()> {
    let raw: Value = serde_json::from_str(params).context("--params is not valid JSON")?;
    let Value::Array(items) = raw else {
        return Err(anyhow!("--params must be a JSON array"));
    };
    let params = items
        .iter()
        .map(Param::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("bad parameter: {e}"))?;
    let expect: ResultKind = expect.parse().map_err(|e: String| anyhow!(e))?;

    let client = registry.get(network)?;
    let call = RpcCall::custom(method, params, expect);
    let value = match pin {
        Some(index) => client.call_pinned(index, call).await?,
        None => client.call(call).await?,
    };

    match value.as_json() {
        Some(json) => println!("{}", serde_json::to_string_pretty(json)?),
        None => println!("{value}"),
    }
    Ok(())
}

async fn cmd_probe(registry: &ChainRegistry, network: &str) -> Result<()> {
    let client = registry.get(network)?;
    let endpoints = client.pool().snapshot();

    let probes = endpoints.iter().map(|endpoint| {
        let client = &client;
        async move {
            let start = Instant::now();
            let result = client.call_pinned(endpoint.index(), RpcCall::BlockNumber).await;
            (endpoint, result, start.elapsed())
        }
    });

    let mut healthy = 0;
    for (endpoint, result, latency) in futures::future::join_all(probes).await {
        match result {
            Ok(head) => {
                healthy += 1;
                println!(
                    "  [{}] {:<40} OK    block {head}  {}ms",
                    endpoint.index(),
                    endpoint.redacted(),
                    latency.as_millis()
                );
            }
            Err(e) => println!(
                "  [{}] {:<40} FAIL  {e}",
                endpoint.index(),
                endpoint.redacted()
            ),
        }
    }

    println!("{healthy}/{} endpoints healthy", endpoints.len());
    if healthy == 0 {
        return Err(anyhow!("no healthy endpoint for {network}"));
    }
    Ok(())
}
