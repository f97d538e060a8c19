use anyhow::Result;
use std::{collections::HashMap, env, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};
use waploader::{
    config::Settings,
    handler::{self, AppState},
    secrets::GcpSecretStore,
    vendor::transport::HttpVendorClient,
    warehouse::bigquery::BigQueryWarehouse,
};
use warp::{http::StatusCode, reject::Rejection, reply::Reply, Filter};

async fn health_check() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "planning-export-loader"
    })))
}

async fn trigger(
    query: HashMap<String, String>,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let (status, body) = handler::handle_trigger(&state, &query).await;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();

    info!("starting planning export loader");

    let settings = Settings::from_env()?;
    let http = reqwest::Client::new();

    let secrets = GcpSecretStore::new(
        http.clone(),
        settings.gcp_project.clone(),
        settings.secret_id.clone(),
    );
    let vendor = HttpVendorClient::new(http, settings.endpoint.clone());
    let warehouse = BigQueryWarehouse::connect().await?;

    let state = Arc::new(AppState {
        settings,
        secrets: Arc::new(secrets),
        vendor: Arc::new(vendor),
        warehouse: Arc::new(warehouse),
    });

    // Health check endpoint
    let health = warp::path("health").and(warp::get()).and_then(health_check);

    // Trigger endpoint: GET or POST to /, parameters in the query string
    let state_filter = warp::any().map(move || state.clone());
    let run = warp::path::end()
        .and(warp::get().or(warp::post()).unify())
        .and(warp::query::<HashMap<String, String>>())
        .and(state_filter)
        .and_then(trigger);

    let routes = health.or(run);

    // Cloud Run supplies PORT; default to 8080 elsewhere
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    info!("server starting on port {}", port);
    info!("health check: http://localhost:{}/health", port);
    info!("trigger endpoint: http://localhost:{}/", port);

    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
