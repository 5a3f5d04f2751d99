//! pet-fetcher: binary entrypoint
//! Reads configuration from the environment (and `.env`), then polls the
//! Petfinder API until Ctrl-C, logging every match.

use anyhow::Context;
use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pet_fetcher::{Fetcher, FetcherConfig, ResultSink, TickOutcome};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pet_fetcher=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

/// Expose Prometheus metrics when METRICS_ADDR (e.g. 0.0.0.0:9000) is set.
fn init_metrics() -> anyhow::Result<()> {
    let Ok(addr) = std::env::var("METRICS_ADDR") else {
        return Ok(());
    };
    let addr: SocketAddr = addr.parse().context("METRICS_ADDR is not host:port")?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    info!(%addr, "metrics exporter listening");
    Ok(())
}

struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn deliver(&self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Found {
                animals,
                pagination,
            } => {
                for a in &animals {
                    info!(
                        id = a.id,
                        name = %a.name,
                        kind = %a.animal_type,
                        distance = ?a.distance,
                        url = %a.url,
                        "match"
                    );
                }
                info!(
                    shown = animals.len(),
                    total = pagination.total_count,
                    "matches this tick"
                );
            }
            TickOutcome::NoMatches { .. } => info!("no matches this tick"),
            TickOutcome::Failed(e) if e.is_auth() => {
                error!(error = %e, "tick failed: check PF_API_KEY / PF_API_SECRET")
            }
            TickOutcome::Failed(e) => warn!(error = %e, "tick failed"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    init_metrics()?;

    let cfg = FetcherConfig::from_env()?;
    // Safe diagnostics: only lengths of secrets
    info!(
        base_url = %cfg.base_url,
        key_len = cfg.api_key.len(),
        interval_secs = cfg.interval.as_secs(),
        "config loaded"
    );

    let fetcher = Fetcher::connect(&cfg)?;

    match fetcher.source().animal_types().await {
        Ok(types) => {
            let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
            info!(types = ?names, "animal types available");
        }
        Err(e) => warn!(error = %e, "could not list animal types"),
    }

    let handle = fetcher.start(LogSink)?;
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("shutting down");
    handle.stop().await;
    Ok(())
}
