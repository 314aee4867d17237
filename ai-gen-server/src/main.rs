mod config;
mod routes;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{error, info, warn};

use ai_gen_core::corpus::Corpus;
use ai_gen_core::io::build_output_path;
use ai_gen_core::model::transition_table::TransitionTable;
use ai_gen_core::orchestrator::Orchestrator;
use ai_gen_core::provider::RemoteClient;

use config::ServerConfig;
use routes::AppState;

/// Loads the corpus, builds (or reloads) the transition table and wires the providers.
fn build_state(config: &ServerConfig) -> Result<AppState, Box<dyn std::error::Error>> {
	let corpus = Corpus::load(&config.corpus)?;
	let cache = if config.cache_model {
		Some(build_output_path(&config.corpus, "bin")?)
	} else {
		None
	};
	let table = TransitionTable::load_or_build(&corpus, config.order, cache.as_deref())?;
	info!("Transition table ready: {} prefixes (order {})", table.len(), table.order());

	let remote_config = config.remote();
	let remote = if remote_config.is_configured() {
		info!("Remote provider enabled ({})", remote_config.base_url);
		Some(RemoteClient::new(remote_config)?)
	} else {
		warn!("OPENAI_API_KEY is not set, only the local provider is available");
		None
	};

	Ok(AppState {
		orchestrator: Orchestrator::new(Arc::new(table), remote, config.generation()),
	})
}

/// Main entry point for the server.
///
/// Loads the corpus and the transition table, then starts the HTTP server.
///
/// # Notes
/// - Configuration comes from flags or environment variables (see `ServerConfig`).
/// - Without an API key only the local provider is available.
/// - Exits with status 1 if the corpus or the model cannot be loaded.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let config = ServerConfig::parse();
	let state = match build_state(&config) {
		Ok(state) => web::Data::new(state),
		Err(e) => {
			error!("Startup failed: {e}");
			std::process::exit(1);
		}
	};

	info!("Starting server on http://{}:{}", config.host, config.port);

	HttpServer::new(move || {
		let cors = Cors::default()
			.allow_any_origin()
			.allowed_methods(vec!["GET", "POST"])
			.allow_any_header()
			.max_age(3600);

		App::new()
			.wrap(Logger::default())
			.wrap(cors)
			.app_data(state.clone())
			.configure(routes::configure)
	})
		.bind((config.host.as_str(), config.port))?
		.run()
		.await
}
