//! Success/failure envelope returned by every inbound query.

use crate::error::AppError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// Wraps an error without leaking internal details for non-client errors.
    pub fn from_error(err: &AppError) -> Self {
        let message = if err.is_client_error() {
            err.to_string()
        } else {
            "Failed to retrieve air quality data".to_string()
        };
        Self {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

impl<T> From<crate::error::Result<T>> for ApiResponse<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(data) => ApiResponse::ok(data),
            Err(e) => ApiResponse::from_error(&e),
        }
    }
}
