use crate::store::StoreError;
use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Log store failure (lock timeout, open error, corrupt file)
    Store(StoreError),
    /// Malformed request parameters
    BadRequest(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(err) => write!(f, "Store error: {}", err),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Store(err) => err.kind(),
        AppError::BadRequest(_) => "bad_request",
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let error = AppError::BadRequest("from must be an integer".to_string());
        assert_eq!(error.to_string(), "Bad request: from must be an integer");
    }

    #[test]
    fn test_error_type_name() {
        let timeout = AppError::Store(StoreError::LockTimeout {
            owner: "query",
            waited: Duration::from_secs(10),
        });
        assert_eq!(error_type_name(&timeout), "lock_timeout");
        assert_eq!(error_type_name(&AppError::Store(StoreError::Inaccessible)), "inaccessible");
    }

    #[tokio::test]
    async fn test_every_store_error_is_500() {
        let response = AppError::Store(StoreError::Task("join failed".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::BadRequest("x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
