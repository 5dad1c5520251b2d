// library system

use libcat::{
	api::{self, AppState},
	store, Config, Library,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// a missing .env is fine, the environment may already be set
	dotenvy::dotenv().ok();

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = Config::from_env()?;
	let store = store::open(&config.store).await?;
	let library = Library::new(store, config.policy).with_bcrypt_cost(config.auth.bcrypt_cost);

	let app = api::router(AppState::new(library, config.auth), Some(config.cover_dir.clone()));

	let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
	tracing::info!(addr = %config.bind_addr, loan_days = config.policy.loan_days, "listening");
	axum::serve(listener, app).await?;
	Ok(())
}
