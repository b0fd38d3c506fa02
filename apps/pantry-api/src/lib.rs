pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = pantry_cli::VERSION,
	rename_all = "kebab",
	styles = pantry_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = pantry_config::load(&args.config)?;

	init_tracing(&config)?;
	warn_missing_credentials(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let sweep_interval = Duration::from_secs(config.rate_limit.sweep_interval_secs);
	let state = AppState::new(config);
	let sweeper = spawn_sweeper(state.clone(), sweep_interval);
	let app = routes::router(state.clone());
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(http_listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	sweeper.abort();
	state.service.shutdown().await;

	tracing::info!("HTTP server stopped.");

	Ok(())
}

fn init_tracing(config: &pantry_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}

// Requests still fail individually without a credential; this only surfaces it at boot.
fn warn_missing_credentials(config: &pantry_config::Config) {
	for env in [&config.providers.generation.api_key_env, &config.providers.image.api_key_env] {
		if let Err(err) = pantry_config::api_key(env) {
			tracing::error!(error = %err, "Provider credential is missing.");
		}
	}
}

fn spawn_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(every);

		// The first tick completes immediately.
		ticker.tick().await;

		loop {
			ticker.tick().await;

			let dropped = state.service.governor.sweep();

			tracing::debug!(
				dropped,
				tracked = state.service.governor.tracked_identities(),
				"Rate limit sweep finished."
			);
		}
	})
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for the shutdown signal.");

		std::future::pending::<()>().await;
	}

	tracing::info!("Shutdown signal received.");
}
