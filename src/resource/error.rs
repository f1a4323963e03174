use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResourceClientError {
    #[error("resource manager answered `{status}`, code `{code}`: `{message}`")]
    UnsuccessfulResponse {
        status: u16,
        code: String,
        message: String,
    },
    #[error("long running operation ended as `{status}`: `{message}`")]
    OperationFailed { status: String, message: String },
    #[error("long running operation still running after {0} polls")]
    PollingExhausted(u32),
    #[error("error computing the request: `{0}`")]
    Encoder(String),
    #[error("error decoding the response payload: `{0}`")]
    Decoder(String),
    #[error("transport error: `{0}`")]
    Transport(String),
}

impl ResourceClientError {
    /// Builds the error for a non successful answer, extracting the error code and message
    /// from the body when it follows the resource manager error format.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(ErrorResponse { error }) => Self::UnsuccessfulResponse {
                status,
                code: error.code,
                message: error.message,
            },
            Err(_) => Self::UnsuccessfulResponse {
                status,
                code: String::default(),
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }

    /// HTTP status of the answer that caused the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnsuccessfulResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn resource_manager_error_body() {
        let body = br#"{"error":{"code":"AuthorizationFailed","message":"The client does not have authorization"}}"#;

        let err = ResourceClientError::from_response(403, body);

        assert_eq!(
            err,
            ResourceClientError::UnsuccessfulResponse {
                status: 403,
                code: "AuthorizationFailed".to_string(),
                message: "The client does not have authorization".to_string(),
            }
        );
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn unstructured_error_body() {
        let err = ResourceClientError::from_response(502, b"Bad Gateway");

        assert_matches!(err, ResourceClientError::UnsuccessfulResponse { status: 502, code, message } => {
            assert!(code.is_empty());
            assert_eq!(message, "Bad Gateway");
        });
    }
}
