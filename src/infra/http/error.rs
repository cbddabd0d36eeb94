use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use icelog_api_types::{ErrorBody, STATUS_ERROR};

use crate::application::{
    auth::AuthError, error::ErrorReport, filter::FilterError, readings::ReadingError,
    repos::RepoError,
};

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_FILTER: &str = "invalid_filter";
    pub const VALIDATION: &str = "validation_error";
    pub const EMPTY_UPDATE: &str = "empty_update";
    pub const NOT_FOUND: &str = "not_found";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "unsupported_media_type";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const TOKEN_EXPIRED: &str = "token_expired";
    pub const STORE: &str = "store_error";
    pub const INTERNAL: &str = "internal_error";
}

/// Error response: a public JSON body plus an internal diagnostic for the
/// response logger. `detail` never reaches the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Reading not found",
            None,
        )
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, codes::UNAUTHORIZED, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let summary = self
            .detail
            .as_deref()
            .or(self.hint.as_deref())
            .unwrap_or(self.message);
        let report = ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {summary}", self.code),
        );

        let body = ErrorBody {
            status: STATUS_ERROR.to_string(),
            code: self.code.to_string(),
            message: self.message.to_string(),
            hint: self.hint,
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_FILTER,
            "Invalid query parameters",
            Some(err.to_string()),
        )
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found(),
            RepoError::Validation { reason, .. } => Self::new(
                StatusCode::BAD_REQUEST,
                codes::VALIDATION,
                "Validation failed",
                Some(reason),
            ),
            RepoError::EmptyUpdate => Self::new(
                StatusCode::BAD_REQUEST,
                codes::EMPTY_UPDATE,
                "No updatable fields supplied",
                None,
            ),
            RepoError::BatchTooLarge { size, limit } => Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::PAYLOAD_TOO_LARGE,
                "Batch too large",
                Some(format!("received {size} rows; at most {limit} are accepted")),
            ),
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::STORE,
                "Internal server error",
                None,
            )
            .with_detail(other.to_string()),
        }
    }
}

impl From<ReadingError> for ApiError {
    fn from(err: ReadingError) -> Self {
        match err {
            ReadingError::Filter(err) => err.into(),
            ReadingError::Repo(err) => err.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => Self::unauthorized("Authentication required"),
            AuthError::Expired => Self::new(
                StatusCode::UNAUTHORIZED,
                codes::TOKEN_EXPIRED,
                "Token expired",
                None,
            ),
            AuthError::Invalid(reason) => {
                Self::unauthorized("Invalid token").with_detail(reason)
            }
            AuthError::Signing(reason) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Internal server error",
                None,
            )
            .with_detail(reason),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        let (code, message) = match status {
            StatusCode::PAYLOAD_TOO_LARGE => (codes::PAYLOAD_TOO_LARGE, "Request body too large"),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => (
                codes::UNSUPPORTED_MEDIA_TYPE,
                "Expected an application/json body",
            ),
            _ => (codes::BAD_REQUEST, "Invalid JSON body"),
        };
        Self::new(status, code, message, Some(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("Invalid query string", Some(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request("Invalid reading id", Some(rejection.body_text()))
    }
}
