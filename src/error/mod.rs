use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for payment operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment error types
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Payment service unavailable, retry after {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Culqi error ({status}): {message}")]
    Culqi {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Shorthand for a validation error without details
    pub fn validation(message: impl Into<String>) -> Self {
        PaymentError::Validation {
            message: message.into(),
            details: None,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation { .. } => "VALIDATION_ERROR",
            PaymentError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            PaymentError::Network(_) => "NETWORK_ERROR",
            PaymentError::Culqi { .. } => "CULQI_ERROR",
            PaymentError::Config(_) => "CONFIG_ERROR",
            PaymentError::Io(_) | PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation { .. } => StatusCode::BAD_REQUEST,
            PaymentError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Culqi { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            PaymentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PaymentError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure is transient and worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::CircuitOpen { .. } | PaymentError::Network(_) => true,
            PaymentError::Culqi { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            PaymentError::Validation { details, .. } | PaymentError::Culqi { details, .. } => {
                details.as_ref()
            }
            _ => None,
        }
    }

    /// Human-readable message without the variant prefix
    pub fn message(&self) -> String {
        match self {
            PaymentError::Validation { message, .. } | PaymentError::Culqi { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    /// Normalized error body shared by logs and HTTP responses
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "code": self.code(),
            "message": self.message(),
            "statusCode": self.status_code().as_u16(),
            "retryable": self.is_retryable(),
        });
        if let Some(details) = self.details() {
            body["details"] = details.clone();
        }
        body
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": self.to_json(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PaymentError::validation("bad").code(), "VALIDATION_ERROR");
        assert_eq!(
            PaymentError::CircuitOpen {
                retry_after_secs: 10
            }
            .code(),
            "CIRCUIT_OPEN"
        );
        assert_eq!(PaymentError::Network("down".into()).code(), "NETWORK_ERROR");
        assert_eq!(
            PaymentError::Culqi {
                status: 402,
                message: "declined".into(),
                details: None
            }
            .code(),
            "CULQI_ERROR"
        );
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            PaymentError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PaymentError::Network("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PaymentError::Culqi {
                status: 402,
                message: "declined".into(),
                details: None
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PaymentError::Network("reset".into()).is_retryable());
        assert!(PaymentError::Culqi {
            status: 503,
            message: "unavailable".into(),
            details: None
        }
        .is_retryable());
        assert!(!PaymentError::Culqi {
            status: 400,
            message: "bad request".into(),
            details: None
        }
        .is_retryable());
        assert!(!PaymentError::validation("bad").is_retryable());
    }

    #[test]
    fn test_error_json_body() {
        let err = PaymentError::Culqi {
            status: 402,
            message: "Tarjeta sin fondos".into(),
            details: Some(json!({"decline_code": "insufficient_funds"})),
        };
        let body = err.to_json();
        assert_eq!(body["code"], "CULQI_ERROR");
        assert_eq!(body["message"], "Tarjeta sin fondos");
        assert_eq!(body["statusCode"], 402);
        assert_eq!(body["retryable"], false);
        assert_eq!(body["details"]["decline_code"], "insufficient_funds");

        let body = PaymentError::Network("timeout".into()).to_json();
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = PaymentError::validation("amount must be positive");
        assert_eq!(err.to_string(), "Validation error: amount must be positive");
    }
}
