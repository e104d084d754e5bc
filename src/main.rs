use axum::{middleware as axum_middleware, routing::get, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod auth;
mod config;
mod connections;
mod database;
mod error;
mod handlers;
mod middleware;
mod profiles;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Initialize configuration (this loads the config singleton)
    let config = crate::config::config();
    tracing::info!("Starting Carelink API in {:?} mode", config.environment);

    // Bring the schema up before serving traffic
    match crate::database::DatabaseManager::pool().await {
        Ok(pool) => {
            if let Err(e) = crate::database::migrations::run(&pool).await {
                tracing::error!("Migration failure: {}", e);
            }
        }
        Err(e) => tracing::warn!("Database unavailable at startup: {}", e),
    }

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("CARELINK_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Carelink API server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Protected connection API
        .merge(connection_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn connection_routes() -> Router {
    use axum::routing::{patch, post};
    use handlers::connections;

    Router::new()
        .route(
            "/api/connections",
            post(connections::create),
        )
        .route(
            "/api/connections/:id",
            get(connections::get),
        )
        .route(
            "/api/connections/:id/status",
            post(connections::set_status),
        )
        .route(
            "/api/connections/:id/flags",
            post(connections::set_overlay_flag),
        )
        .route(
            "/api/connections/:id/proposals",
            post(connections::propose_times),
        )
        .route(
            "/api/connections/:id/proposals/respond",
            post(connections::respond_to_proposal),
        )
        .route(
            "/api/connections/:id/intent",
            patch(connections::update_intent),
        )
        .route_layer(axum_middleware::from_fn(middleware::jwt_auth_middleware))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Carelink API",
            "version": version,
            "description": "Senior-care marketplace connection engine built with Rust (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "connections": "/api/connections[/:id] (protected)",
                "status": "/api/connections/:id/status (protected)",
                "flags": "/api/connections/:id/flags (protected)",
                "proposals": "/api/connections/:id/proposals[/respond] (protected)",
                "intent": "/api/connections/:id/intent (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match crate::database::DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
