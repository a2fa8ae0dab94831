use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

use transmission_proxy::api::client::TransmissionClient;
use transmission_proxy::core::config::Config;
use transmission_proxy::core::routes::build_router;
use transmission_proxy::core::state::AppState;
use transmission_proxy::core::tracing_init;
use transmission_proxy::security::firewall::{Firewall, NftCli};
use transmission_proxy::tasks::scheduler::Scheduler;

fn main() -> Result<()> {
    let conf_dir = parse_conf_dir();

    let config = Config::load(&conf_dir).with_context(|| {
        format!(
            "Failed to load configuration from '{}'. A conf.toml is materialised there on first \
             start; adjust the values and restart.",
            conf_dir.display()
        )
    })?;

    tracing_init::init_tracing(&config.service);

    let worker_threads = config.service.worker_threads.unwrap_or_else(num_cpus::get);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config))
}

/// `-conf <dir>` selects the configuration directory, default `./conf`.
fn parse_conf_dir() -> PathBuf {
    let args: Vec<String> = env::args().collect();
    for window in args.windows(2) {
        if window[0] == "-conf" {
            return PathBuf::from(&window[1]);
        }
    }
    PathBuf::from("./conf")
}

async fn async_main(config: Config) -> Result<()> {
    info!(
        conf_dir = %config.conf_dir.display(),
        rpc_url = %config.infra.tr.rpc_url,
        host = %config.trigger.http.host,
        port = config.trigger.http.port,
        log_level = %config.service.log_level,
        "transmission-proxy starting"
    );

    // Transmission must be reachable and version-compatible before anything
    // else comes up.
    let tr = TransmissionClient::new(
        &config.infra.tr.rpc_url,
        Duration::from_secs(config.trigger.http.timeout),
    )?;
    tr.ensure_compatible()
        .await
        .context("Transmission RPC version negotiation failed")?;

    // Deny tables go in next; failure here is fatal as well.
    let firewall = Firewall::new(Box::new(NftCli));
    firewall
        .setup()
        .context("failed to install packet filter tables")?;

    let state = Arc::new(AppState::new(config, tr, firewall)?);

    // Install the persisted totals; session counters start at zero.
    let historical = state
        .history
        .load_or_init()
        .context("failed to load historical statistics")?;
    state.snapshot.install_historical(historical);
    info!(
        total_downloaded = historical.total_downloaded,
        total_uploaded = historical.total_uploaded,
        "historical statistics loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::spawn(state.clone(), shutdown_rx);

    let app = build_router(state.clone()).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            )
            // panics in handlers become 500s instead of killing the worker
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(Duration::from_secs(
                state.config.trigger.http.timeout,
            ))),
    );

    let addr = format!(
        "{}:{}",
        state.config.trigger.http.host, state.config.trigger.http.port
    );
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener to {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("shutting down");
    shutdown_tx.send(true).ok();
    scheduler.join().await;

    if let Err(err) = state.firewall.teardown() {
        error!(error = %err, "packet filter teardown failed");
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
