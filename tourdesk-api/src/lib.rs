use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod dashboard;
pub mod employees;
pub mod error;
pub mod events;
pub mod extract;
pub mod guide;
pub mod instances;
pub mod middleware;
pub mod payments;
pub mod providers;
pub mod state;
pub mod telemetry;
pub mod tours;
pub mod users;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let staff = Router::new()
        .merge(users::routes())
        .merge(employees::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::require_admin));

    let operations = Router::new()
        .merge(users::guide_directory())
        .merge(providers::routes())
        .merge(tours::routes())
        .merge(instances::routes())
        .merge(bookings::routes())
        .merge(payments::routes())
        .merge(dashboard::routes())
        .merge(events::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::require_operations));

    let field = guide::routes().route_layer(from_fn_with_state(state.clone(), middleware::require_guide));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(telemetry::metrics_handler))
        .merge(auth::routes(&state))
        .merge(staff)
        .merge(operations)
        .merge(field)
        .layer(from_fn_with_state(state.clone(), telemetry::track_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
