use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::validation::{FieldError, FieldErrors};

/// Message shown to an actor whose request was refused by the authorization gate.
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied!";

/// Where the client is sent after a refused request.
pub const HOME_PATH: &str = "/";

/// AppError
///
/// Every failure the core can report. All variants are recoverable at the request
/// boundary; none of them is retried automatically.
#[derive(Debug, Error)]
pub enum AppError {
    /// One or more field rules were violated. Always carries the complete set.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Unknown identifier or unmatched activation token.
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// The authorization gate refused the action.
    #[error("access denied")]
    AccessDenied,

    #[error("invalid email/password combination")]
    InvalidCredentials,

    #[error("account is waiting for activation")]
    PendingActivation,

    /// The request body or query string could not be read.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Store or infrastructure failure. The detail is logged, never shown.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound(entity, id.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::AccessDenied | AppError::PendingActivation => StatusCode::FORBIDDEN,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The navigation outcome paired with the error. Validation failures re-render the
    /// submitted form, so they carry no redirect.
    pub fn redirect_to(&self) -> Option<&'static str> {
        match self {
            AppError::AccessDenied | AppError::PendingActivation => Some(HOME_PATH),
            _ => None,
        }
    }

    fn alert(&self) -> String {
        match self {
            AppError::Validation(errors) => format!(
                "The form contains {} error{}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ),
            AppError::NotFound(entity, _) => format!("{} not found", entity),
            AppError::AccessDenied => ACCESS_DENIED_MESSAGE.to_string(),
            AppError::InvalidCredentials => "Invalid email/password combination".to_string(),
            AppError::PendingActivation => {
                "Your account is not activated yet. Check your email".to_string()
            }
            AppError::BadRequest(detail) => format!("The request could not be read: {}", detail),
            AppError::Internal(_) => "Something went wrong".to_string(),
        }
    }
}

// Logged once, by `into_response`.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(format!("database error: {:?}", e))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        match rejection {
            PathRejection::FailedToDeserializePathParams(inner) => {
                AppError::not_found("Resource", inner.body_text())
            }
            other => AppError::Internal(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// ErrorBody
///
/// Wire shape of every failed request: a user-facing alert, the navigation outcome,
/// and the field errors when the failure was a validation one.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub alert: String,
    pub redirect_to: Option<String>,
    pub errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!("request failed: {}", detail);
        }

        let body = ErrorBody {
            alert: self.alert(),
            redirect_to: self.redirect_to().map(str::to_string),
            errors: match &self {
                AppError::Validation(errors) => errors.iter().cloned().collect(),
                _ => vec![],
            },
        };

        (self.status(), Json(body)).into_response()
    }
}
