//! Error handling for the bookshelf HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookshelf_db::DbError;
use serde::Serialize;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Standard error response format for all HTTP errors
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
    pub details: Vec<serde_json::Value>,
    pub trace_id: String,
    pub timestamp: String,
}

/// Application error types that map to HTTP responses
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed fields in a request body (400)
    #[error("validation error: {message}")]
    Validation {
        details: Vec<serde_json::Value>,
        code: String,
        message: String,
    },

    /// Malformed path, query or body that never reached validation (400)
    #[error("bad request: {message}")]
    BadRequest { message: String, code: String },

    #[error("not found: {message}")]
    NotFound { message: String, code: String },

    /// The database could not be reached (500, detail logged only)
    #[error("database unavailable: {0:#}")]
    Connectivity(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(details: Vec<serde_json::Value>, message: impl Into<String>) -> Self {
        Self::Validation {
            details,
            code: "validation_error".to_string(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            code: "bad_request".to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            code: "not_found".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Connectivity(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        if err.is_connectivity() {
            Self::Connectivity(err.into())
        } else {
            Self::Internal(err.into())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let timestamp = now.format(&Rfc3339).unwrap_or_else(|_| now.to_string());
        let status = self.status();

        let (code, message, details) = match self {
            AppError::Validation {
                details,
                code,
                message,
            } => {
                tracing::debug!(error_id = %error_id, error_code = %code, %message, "request rejected");
                (code, message, details)
            }
            AppError::BadRequest { message, code } | AppError::NotFound { message, code } => {
                tracing::debug!(
                    error_id = %error_id,
                    error_code = %code,
                    status_code = status.as_u16(),
                    %message,
                    "request rejected"
                );
                (code, message, Vec::new())
            }
            AppError::Connectivity(e) => {
                tracing::error!(error_id = %error_id, error = %format!("{:#}", e), "database unavailable");
                ("database_unavailable".to_string(), INTERNAL_MESSAGE.to_string(), Vec::new())
            }
            AppError::Internal(e) => {
                tracing::error!(error_id = %error_id, error = %format!("{:#}", e), "request failed");
                ("internal_error".to_string(), INTERNAL_MESSAGE.to_string(), Vec::new())
            }
        };

        let body = ErrorBody {
            success: false,
            message,
            code,
            details,
            trace_id: error_id.to_string(),
            timestamp,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_validation_error() {
        let details = vec![json!({"field": "pages", "error": "required"})];
        let error = AppError::validation(details.clone(), "All fields are required.");

        match error {
            AppError::Validation {
                details: d,
                code,
                message,
            } => {
                assert_eq!(d, details);
                assert_eq!(code, "validation_error");
                assert_eq!(message, "All fields are required.");
            }
            _ => panic!("Expected Validation error"),
        }
    }

    #[tokio::test]
    async fn validation_maps_to_400_with_details() {
        let details = vec![json!({"field": "pages", "error": "required"})];
        let response = AppError::validation(details, "All fields are required.").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("All fields are required."));
        assert_eq!(body["code"], json!("validation_error"));
        assert_eq!(body["details"][0]["field"], json!("pages"));
        assert!(Uuid::parse_str(body["trace_id"].as_str().unwrap()).is_ok());
        assert!(OffsetDateTime::parse(body["timestamp"].as_str().unwrap(), &Rfc3339).is_ok());
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = AppError::not_found("Book not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], json!("Book not found"));
    }

    #[tokio::test]
    async fn internal_error_detail_is_not_leaked() {
        let error = AppError::Internal(anyhow::anyhow!("relation \"books\" does not exist"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], json!("Internal server error"));
        assert!(!body.to_string().contains("relation"));
    }

    #[tokio::test]
    async fn db_errors_split_by_connectivity() {
        let closed = AppError::from(DbError::Closed);
        assert!(matches!(closed, AppError::Connectivity(_)));
        let response = closed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], json!("database_unavailable"));

        let decode = AppError::from(DbError::Decode {
            column: "price".into(),
            type_name: "NUMERIC".into(),
            reason: "unsupported column type".into(),
        });
        assert!(matches!(decode, AppError::Internal(_)));
    }
}
