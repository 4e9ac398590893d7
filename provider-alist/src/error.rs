//! Error types for the AList provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// AList provider errors
#[derive(Error, Debug)]
pub enum AlistError {
    /// The token was rejected, either by HTTP status or by the envelope code
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("AList API error (code {code}): {message}")]
    ApiError { code: i64, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for AList operations
pub type Result<T> = std::result::Result<T, AlistError>;

impl From<AlistError> for BridgeError {
    fn from(error: AlistError) -> Self {
        match error {
            AlistError::AuthenticationFailed(msg) => BridgeError::Unauthorized(msg),
            AlistError::ApiError { code, message } => {
                BridgeError::OperationFailed(format!("API error (code {}): {}", code, message))
            }
            AlistError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            AlistError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AlistError::ApiError {
            code: 500,
            message: "object not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "AList API error (code 500): object not found"
        );
    }

    #[test]
    fn test_auth_failure_maps_to_unauthorized() {
        let bridge_error: BridgeError =
            AlistError::AuthenticationFailed("token is invalidated".to_string()).into();

        assert!(bridge_error.is_unauthorized());
    }

    #[test]
    fn test_parse_error_maps_to_operation_failed() {
        let bridge_error: BridgeError = AlistError::ParseError("eof".to_string()).into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));
    }
}
