use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{Environment, SecurityConfig};
use crate::handlers;
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full router: public routes, JWT-protected routes, global layers
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        .merge(protected_routes(state.clone()));

    let router = match cors_layer(&state.config.security, state.config.environment) {
        Some(cors) => router.layer(cors),
        None => router,
    };
    let router = if state.config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use handlers::public::auth;

    Router::new()
        .route("/api/auth/login", post(auth::login_post))
        .route("/api/auth/logout", post(auth::logout_post))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use handlers::protected::{auth, whatsapp};

    Router::new()
        .route("/api/auth/profile", get(auth::profile_get))
        .route("/api/whatsapp/status", get(whatsapp::status_get))
        .route("/api/whatsapp/create-instance", post(whatsapp::create_instance_post))
        .route(
            "/api/whatsapp/check-connection/:instance_name",
            get(whatsapp::check_connection_get),
        )
        .route("/api/whatsapp/update-status", post(whatsapp::update_status_post))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(security: &SecurityConfig, environment: Environment) -> Option<CorsLayer> {
    if !security.enable_cors {
        return None;
    }
    if environment == Environment::Development || security.cors_origins.iter().any(|o| o == "*") {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "WhatsApp Dashboard API",
            "version": version,
            "description": "Authentication and WhatsApp instance provisioning for the dashboard",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "POST /api/auth/login, POST /api/auth/logout (public)",
                "auth": "GET /api/auth/profile (protected)",
                "whatsapp": "/api/whatsapp/status, create-instance, check-connection/:instance_name, update-status (protected)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.stores.accounts.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Store health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "message": "store unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "store": "unavailable"
                    }
                })),
            )
        }
    }
}
