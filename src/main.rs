use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keygate::{api, cli, config, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Export spans over OTLP only when a collector is configured.
    use opentelemetry::KeyValue;

    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "keygate"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "keygate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let args = cli::Cli::parse();

    let bind = match args.command {
        Some(cli::Commands::GenSecret { bytes }) => {
            gen_secret(bytes as usize);
            return Ok(());
        }
        Some(cli::Commands::Serve { bind }) => bind,
        None => None,
    };

    let result = match config::load() {
        Ok(cfg) => run_server(cfg, bind).await,
        Err(e) => Err(e),
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    opentelemetry::global::shutdown_tracer_provider();
    result
}

async fn run_server(mut cfg: config::Config, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        cfg.bind_address = addr;
    }
    tracing::debug!(config = ?cfg, "configuration loaded");

    let state = Arc::new(AppState::from_config(&cfg)?);

    let sweeper = jobs::sweeper::spawn(
        state.registry.clone(),
        state.metrics.clone(),
        cfg.sweep_interval,
    );
    tracing::info!(
        "Expiry sweeper started (every {:?}, request timeout {:?})",
        cfg.sweep_interval,
        cfg.request_timeout
    );

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(cfg.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_address))?;
    tracing::info!("keygate listening on {}", cfg.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("keygate stopped; pending requests discarded");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn gen_secret(bytes: usize) {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    println!("{}", hex::encode(&buf));
}
