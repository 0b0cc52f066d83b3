use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// ARM answered with a non-success status
    #[error("unexpected status {status} with error: {code}: {message}")]
    ArmError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("timed out waiting for the operation to complete")]
    Timeout,

    #[error("the operation was cancelled")]
    Cancelled,

    /// A long-running operation finished in a failed or cancelled state
    #[error("the operation finished with status {status}: {code}: {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    #[error("Too many requests, rate limited")]
    RateLimited,

    #[error("Service unavailable, retry later")]
    ServiceUnavailable,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ArmError { status, .. } => Some(*status),
            ApiError::RequestError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Builds an [`ApiError::ArmError`] from a response body, falling back to
    /// the raw text when it is not an ARM error envelope.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ArmErrorEnvelope>(body) {
            Ok(ArmErrorEnvelope { error }) => ApiError::ArmError {
                status,
                code: error.code,
                message: error.message,
            },
            Err(_) => ApiError::ArmError {
                status,
                code: "Unknown".to_string(),
                message: if body.is_empty() {
                    "no response body".to_string()
                } else {
                    body.to_string()
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: ArmErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArmErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arm_error_envelope() {
        let err = ApiError::from_response(
            404,
            r#"{"error":{"code":"ResourceGroupNotFound","message":"Resource group 'rg' could not be found."}}"#,
        );
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "unexpected status 404 with error: ResourceGroupNotFound: Resource group 'rg' could not be found."
        );
    }

    #[test]
    fn keeps_raw_body_when_not_an_envelope() {
        let err = ApiError::from_response(409, "conflict");
        match err {
            ApiError::ArmError { status, code, message } => {
                assert_eq!(status, 409);
                assert_eq!(code, "Unknown");
                assert_eq!(message, "conflict");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
