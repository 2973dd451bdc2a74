use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tourdesk_booking::BookingError;
use tourdesk_catalog::CatalogError;
use tourdesk_core::repository::RepositoryError;
use tourdesk_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("too many requests")]
    RateLimited,
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFoundError(_) => StatusCode::NOT_FOUND,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalServerError(_) | AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFoundError(format!("{} not found", what))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(msg) => AppError::ValidationError(msg),
            other => AppError::ConflictError(other.to_string()),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            other => AppError::ConflictError(other.to_string()),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg),
            CoreError::Catalog(e) => e.into(),
            CoreError::Booking(e) => e.into(),
            e @ CoreError::InvalidTransition { .. } => AppError::ConflictError(e.to_string()),
            CoreError::Forbidden(msg) => AppError::AuthorizationError(msg),
            CoreError::IdentityError(msg) => AppError::AuthenticationError(msg),
            CoreError::InternalError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFoundError(format!("{} not found", what)),
            RepositoryError::Conflict(msg) => AppError::ConflictError(msg),
            RepositoryError::Rule(e) => e.into(),
            RepositoryError::Storage(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::ValidationError(e.body_text()),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_errors_map_to_client_statuses() {
        let capacity: AppError = CatalogError::InsufficientCapacity { requested: 4, available: 2 }.into();
        assert_eq!(capacity.status(), StatusCode::CONFLICT);

        let invalid: AppError = BookingError::Validation("customer_name must not be empty".into()).into();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let unpayable: AppError = RepositoryError::from(BookingError::NotPayable("cancelled".into())).into();
        assert_eq!(unpayable.status(), StatusCode::CONFLICT);

        let forbidden: AppError = CoreError::Forbidden("not your assignment".into()).into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let login: AppError = CoreError::IdentityError("invalid email or password".into()).into();
        assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn repository_errors_map_to_statuses() {
        let missing: AppError = RepositoryError::NotFound("booking 42".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "booking 42 not found");

        let taken: AppError = RepositoryError::Conflict("tour code already exists".into()).into();
        assert_eq!(taken.status(), StatusCode::CONFLICT);

        let storage: AppError = RepositoryError::Storage("connection reset".into()).into();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_messages_are_hidden() {
        let response = AppError::InternalServerError("password column missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
