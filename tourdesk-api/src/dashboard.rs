use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use tourdesk_core::views::DashboardSummary;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/dashboard", get(dashboard))
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardSummary>, AppError> {
    let today = Utc::now().date_naive();
    let summary = state
        .reports
        .dashboard(today, state.business_rules.upcoming_window_days)
        .await?;
    Ok(Json(summary))
}
