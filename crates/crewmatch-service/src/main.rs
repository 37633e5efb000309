//! The `crewmatch` binary.
//!
//! Loads the configuration, builds the match engine on the
//! configured storage backend, relays lifecycle events to the log and serves
//! the HTTP API until interrupted.

use clap::Parser;
use crewmatch_config::Config;
use crewmatch_core::{MatchBuilder, MatchEngine, MatchFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod notify;
mod server;

use crewmatch_storage::implementations::file::create_storage as create_file_storage;
use crewmatch_storage::implementations::memory::create_storage as create_memory_storage;

/// Order assignment service for a contractor marketplace.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Configuration file; may include further files
	#[arg(short, long, default_value = "config.toml", env = "CREWMATCH_CONFIG")]
	config: PathBuf,

	/// Default tracing filter when RUST_LOG is unset
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Runs until Ctrl+C, or until the API server exits on its own.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	init_tracing(&args.log_level);

	tracing::info!("Started crewmatch");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!(service = %config.service.id, "Loaded configuration");

	let engine = Arc::new(build_engine(config.clone()).await?);
	engine.initialize().await?;

	let relay = notify::spawn_relay(engine.event_bus());

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let api_task = server::start_server(api_config, Arc::clone(&engine));
			tokio::select! {
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received interrupt");
				}
			}
		},
		None => {
			tracing::info!("API disabled, waiting for interrupt");
			tokio::signal::ctrl_c().await?;
		},
	}

	relay.abort();
	engine.shutdown().await?;
	tracing::info!("Stopped crewmatch");
	Ok(())
}

fn init_tracing(default_filter: &str) {
	use tracing_subscriber::{fmt, EnvFilter};

	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
	fmt()
		.with_env_filter(filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();
}

/// `name => factory` pairs as a map keyed by backend name.
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the match engine with every storage backend this binary ships.
async fn build_engine(config: Config) -> Result<MatchEngine, Box<dyn std::error::Error>> {
	let builder = MatchBuilder::new(config);

	let storage_factories = create_factory_map!(
		crewmatch_storage::StorageInterface,
		crewmatch_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	Ok(builder.build(MatchFactories { storage_factories }).await?)
}
