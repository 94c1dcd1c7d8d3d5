use axum::http::HeaderValue;
use mangrov::config::Config;
use mangrov::{router, AppState};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    let state = match AppState::from_config(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Failed to open data store");
            std::process::exit(1);
        }
    };

    let housekeeping_state = state.clone();
    tokio::spawn(async move {
        housekeeping(housekeeping_state).await;
    });

    let cors = match config.cors_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any),
        Some(Err(_)) => {
            tracing::warn!("MANGROV_CORS_ORIGIN is not a valid header value, allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    };

    let app = router(state).layer(TraceLayer::new_for_http()).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        %addr,
        data_dir = %config.data_dir.display(),
        public_url = %config.public_url,
        "Mangrov API listening"
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server stopped");
        std::process::exit(1);
    }
}

/// Sweeps expired sessions and action codes once a minute.
async fn housekeeping(state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(60));

    loop {
        interval.tick().await;

        let (sessions, codes) = state.auth.purge_expired().await;
        if sessions > 0 || codes > 0 {
            tracing::info!(sessions, codes, "Purged expired credentials");
        }
    }
}
