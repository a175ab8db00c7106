use std::collections::HashMap;

use reqwest::StatusCode;

use crate::protocol::ErrorBody;

/// Error surface of the request pipeline and the services built on it.
///
/// Every failure handed to callers is one of these variants: transport
/// failures never carry a status, HTTP failures always do. Refresh failures
/// are reported through the same variants as any other call.
#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("Invalid URL - {error}")]
    InvalidUrl { error: String },
    #[error("Invalid Header - {error}")]
    InvalidHeader { error: String },
    /// No response was received: connection failure, timeout, or a request
    /// that could not be constructed.
    #[error("Request Error - {error}")]
    Request { error: String },
    /// The server answered with a non-success status. `message` and
    /// `field_errors` are extracted from the error body when it parses.
    #[error("HTTP {status} - {message}")]
    Http {
        status: u16,
        message: String,
        field_errors: Option<HashMap<String, Vec<String>>>,
    },
    #[error("Serde Error - {error}")]
    Serde { error: String },
}

impl ApiClientError {
    /// Status code of the failing response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Normalize a non-success response into [ApiClientError::Http].
    ///
    /// Bodies that fail to parse as the API error shape degrade to the raw
    /// text, then to the canonical status reason.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let (message, field_errors) = match parsed {
            Some(b) => (b.message, b.errors),
            None => (None, None),
        };
        let message = message
            .filter(|m| !m.is_empty())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string()
            });
        ApiClientError::Http {
            status: status.as_u16(),
            message,
            field_errors,
        }
    }
}

impl From<reqwest::Error> for ApiClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request {
            error: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde {
            error: value.to_string(),
        }
    }
}

impl From<serde_urlencoded::ser::Error> for ApiClientError {
    fn from(value: serde_urlencoded::ser::Error) -> Self {
        Self::Serde {
            error: value.to_string(),
        }
    }
}
