use reqwest::StatusCode;
use serde_json::Value;

use crate::storage::StorageError;

pub const GENERAL_ERROR: &str = "Network Error. Please try again.";

/// Display text is what the stores surface to the user.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}", GENERAL_ERROR)]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Invalid Credentials")]
    InvalidCredentials,
    #[error("Unexpected response from server: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Empty response from server")]
    EmptyResponse,
    #[error("Response is missing `{0}`")]
    MissingField(&'static str),
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Maps a non-2xx response to an error, preferring the server's own `error`
/// text unless it is the generic Rails 500 message.
pub fn handle_error(status: StatusCode, body: &Value) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }
    let message = match body.get("error").and_then(|v| v.as_str()) {
        Some("Internal Server Error") | None => GENERAL_ERROR.to_string(),
        Some(text) => text.to_string(),
    };
    Some(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Logs a failure caught at a store boundary. Production builds tag the
/// record so crash collection can pick it up.
pub fn report_error(environment: &str, context: &str, err: &ApiError) {
    if environment.starts_with("production") {
        log::error!(target: "crash_report", "[{}] {}: {:?}", environment, context, err);
    } else {
        log::error!("[{}] {}: {}", environment, context, err);
    }
}
