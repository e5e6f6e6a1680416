mod backend;
mod config;
mod db;
mod gate;
mod model;
mod routes;
mod services;
mod state;

use std::path::Path;
use std::sync::Arc;

use backend::GoTrueClient;
use config::AppConfig;
use services::profile::PgProfileStore;
use services::session::SessionDeps;
use services::setup::AdminSetupClient;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "grantdesk failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let pool = db::init_pool(&config.database_url).await?;
    let auth = GoTrueClient::new(&config.auth_url, config.auth_anon_key.clone(), config.auth_request_timeout_secs)?;
    let deps = SessionDeps {
        backend: Arc::new(auth),
        profiles: Arc::new(PgProfileStore::new(pool)),
        identity: Arc::new(config.identity.clone()),
    };

    let setup = match &config.admin_setup_url {
        Some(url) => Some(AdminSetupClient::new(url.clone(), config.identity.admin_email.clone())?),
        None => {
            tracing::info!("ADMIN_SETUP_URL not set; first-run setup disabled");
            None
        }
    };

    let state = state::AppState::new(deps, setup, state::RouteSettings::from(&config));
    let _sweeper = services::registry::spawn_sweeper(state.sessions.clone(), config.session_sweep_secs);

    let app = routes::app(state, Path::new(&config.web_dir));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!(port = config.port, auth_url = %config.auth_url, "grantdesk listening");
    axum::serve(listener, app).await?;
    Ok(())
}
