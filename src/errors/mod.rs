//! Unified error handling with a consistent result envelope.

use serde::Serialize;

/// Error detail in the result envelope.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Consistent JSON envelope for every command result.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a successful result in the envelope.
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Wrap an error in the envelope.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Application error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Storage quota exceeded: state is {size_mb:.2}MB, limit is {limit_mb:.2}MB")]
    StorageQuota { size_mb: f64, limit_mb: f64 },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Check if this error represents a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Storage failures leave in-memory edits intact but unsaved.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageQuota { .. } | Self::Storage(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            Self::Import(_) => "IMPORT_ERROR",
            Self::StorageQuota { .. } => "STORAGE_QUOTA",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Process exit status reported by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_)
            | Self::Validation(_)
            | Self::Conflict(_)
            | Self::ConfirmationRequired(_)
            | Self::Import(_) => 2,
            Self::StorageQuota { .. } | Self::Storage(_) => 3,
            Self::Serialization(_) | Self::Internal(_) => 1,
        }
    }

    /// Convert into the result envelope, logging internal failures.
    pub fn into_response(self) -> ApiResponse<()> {
        let message = match &self {
            Self::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                "An internal error occurred".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "An internal error occurred".to_string()
            }
            Self::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                format!("Storage access failed: {e}")
            }
            other => other.to_string(),
        };
        ApiResponse::error(self.code(), &message)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_success() {
        let response = ApiResponse::success("hello");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], "hello");
        assert!(json["error"].is_null());
    }

    #[test]
    fn api_response_error() {
        let response = ApiResponse::<()>::error("NOT_FOUND", "Item not found");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "Item not found");
    }

    #[test]
    fn app_error_is_not_found() {
        let err = AppError::NotFound("field".to_string());
        assert!(err.is_not_found());
        assert!(!err.is_storage());
    }

    #[test]
    fn app_error_display() {
        let err = AppError::Validation("system is required".to_string());
        assert_eq!(err.to_string(), "Validation error: system is required");
    }

    #[test]
    fn quota_error_reports_sizes() {
        let err = AppError::StorageQuota {
            size_mb: 4.5,
            limit_mb: 4.0,
        };
        assert!(err.is_storage());
        assert_eq!(err.code(), "STORAGE_QUOTA");
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("4.50MB"));
    }

    #[test]
    fn internal_errors_are_masked_in_envelope() {
        let response = AppError::Internal("boom".to_string()).into_response();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn app_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AppError = io_err.into();
        assert!(matches!(err, AppError::Storage(_)));
    }

    #[test]
    fn storage_message_fits_reads_and_writes() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let json = serde_json::to_value(AppError::from(io_err).into_response()).unwrap();
        assert_eq!(json["error"]["code"], "STORAGE_ERROR");
        assert_eq!(json["error"]["message"], "Storage access failed: denied");
    }
}
