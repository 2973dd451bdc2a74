use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tourdesk_core::staff::{Employee, EmployeeInput};
use tourdesk_shared::{Page, PageRequest};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{JsonBody, PathId, QueryParams},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
struct EmployeeSearch {
    search: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/employees", get(list_employees).post(create_employee))
        .route(
            "/v1/admin/employees/{id}",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

async fn list_employees(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<EmployeeSearch>,
    QueryParams(page): QueryParams<PageRequest>,
) -> Result<Json<Page<Employee>>, AppError> {
    Ok(Json(state.employees.list_employees(query.search.as_deref(), &page).await?))
}

async fn create_employee(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<EmployeeInput>,
) -> Result<(StatusCode, Json<Employee>), AppError> {
    input.validate()?;
    let employee = state.employees.create_employee(&input).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn get_employee(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<Json<Employee>, AppError> {
    let employee = state
        .employees
        .get_employee(id)
        .await?
        .ok_or_else(|| AppError::not_found("employee"))?;
    Ok(Json(employee))
}

async fn update_employee(
    State(state): State<AppState>,
    PathId(id): PathId<Uuid>,
    JsonBody(input): JsonBody<EmployeeInput>,
) -> Result<Json<Employee>, AppError> {
    input.validate()?;
    Ok(Json(state.employees.update_employee(id, &input).await?))
}

async fn delete_employee(State(state): State<AppState>, PathId(id): PathId<Uuid>) -> Result<StatusCode, AppError> {
    state.employees.delete_employee(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
