mod aggregate;
mod chart;
mod dashboard;
mod error;
mod fetch;
mod incident;
mod query;
mod refresh;
mod state;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "prociv-checker")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8081")]
    listen: String,
    #[arg(long, default_value = "https://api.fogos.pt/v2/incidents/search")]
    api_url: String,
    /// Upstream request timeout; requests wait indefinitely when unset.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let args = Args::parse();
    let http_addr = normalize_listen_addr(&args.listen)?;
    let api_url = Url::parse(&args.api_url)
        .with_context(|| format!("invalid api url {}", args.api_url))?;
    let fetcher = fetch::Fetcher::new(args.timeout_secs.map(Duration::from_secs))
        .context("build http client")?;

    let initial_filter = query::FilterState::initial(Utc::now().date_naive());
    let initial = match refresh::refresh(&fetcher, &api_url, &initial_filter).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log::warn!("initial fetch failed, starting with empty figures: {}", err);
            refresh::Snapshot::empty(initial_filter)
        }
    };

    let app_state = state::AppState::new(fetcher, api_url, initial);
    let http_app = dashboard::router(app_state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(http_listener, http_app).with_graceful_shutdown(shutdown_signal());

    log::info!("prociv-checker listening: http={}", http_addr);

    http_server.await?;
    Ok(())
}

fn normalize_listen_addr(listen: &str) -> Result<SocketAddr, anyhow::Error> {
    if listen.starts_with(':') {
        let normalized = format!("0.0.0.0{}", listen);
        return normalized
            .parse()
            .with_context(|| format!("invalid listen address {}", listen));
    }
    listen
        .parse()
        .with_context(|| format!("invalid listen address {}", listen))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
