mod args;
mod config;

use std::io;
use std::net::SocketAddr;

use bridge_app::{AppConfig, AppState};
use http_api::HttpState;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let app_config = AppConfig::from_env()?;
    info!(config = ?app_config, "configuration loaded");

    let cli_config = config::load_or_create(&app_config.data_dir).map_err(io::Error::other)?;
    if cli_config.created {
        info!(
            file = %cli_config.paths.file.display(),
            port = cli_config.config.port,
            "created listener config"
        );
    }
    let port = args.port.unwrap_or(cli_config.config.port);
    let addr = SocketAddr::new(cli_config.config.host, port);

    let (app_state, bridge) = AppState::start(app_config).await?;
    let router = http_api::router(HttpState::new(app_state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "diagnostic server listening");

    let server_stop = CancellationToken::new();
    let server_token = server_stop.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    let outcome = bridge.run_until(shutdown_signal()).await;

    server_stop.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "diagnostic server failed"),
        Err(err) => error!(error = %err, "diagnostic server task failed"),
    }

    if let Err(err) = outcome {
        error!(error = %err, "usage bridge stopped on a fatal error");
        return Err(err.into());
    }
    info!("usage bridge stopped");
    Ok(())
}

fn init_tracing() {
    let default_level = "info";
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
