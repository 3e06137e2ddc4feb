use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult, KnownCause};
use crate::http_client::SimpleHttpResponse;

/// The `{ success, message, data, timestamp }` shape every endpoint returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    // No `default` here: it would demand `T: Default`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// The payload; absent whenever `success` is false
    pub fn data(&self) -> Option<&T> {
        if self.success {
            self.data.as_ref()
        } else {
            None
        }
    }

    /// Take the payload, failing on `success: false` or a missing `data`
    pub fn into_data(self) -> ApiResult<T> {
        if !self.success {
            return Err(ApiError::Unsuccessful {
                message: self
                    .message
                    .unwrap_or_else(|| "Request was not successful".to_string()),
            });
        }
        self.data.ok_or_else(|| ApiError::InvalidResponse {
            status: 200,
            reason: "envelope has no data".to_string(),
        })
    }
}

/// The server's explanation, when the body carries one
fn server_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
}

/// Turn a raw response into its JSON body or a classified error
pub(crate) fn classify(response: &SimpleHttpResponse) -> ApiResult<Value> {
    let status = response.status();

    let body: Value = match serde_json::from_str(response.body()) {
        Ok(body) => body,
        Err(e) if response.is_success() => {
            return Err(ApiError::InvalidResponse {
                status,
                reason: e.to_string(),
            })
        }
        Err(_) => return Err(ApiError::Protocol { status }),
    };

    if response.is_success() {
        return Ok(body);
    }

    let message = server_message(&body);
    let error = match status {
        400 => match message {
            Some(message) => match KnownCause::from_server_message(&message) {
                Some(cause) => ApiError::InvalidRequest {
                    message: cause.message().to_string(),
                    cause: Some(cause),
                },
                None => ApiError::InvalidRequest {
                    message,
                    cause: None,
                },
            },
            None => ApiError::InvalidRequest {
                message: "Bad request".to_string(),
                cause: None,
            },
        },
        401 => ApiError::AuthenticationRequired {
            message: message.unwrap_or_else(|| "Unauthorized".to_string()),
        },
        409 => ApiError::Conflict {
            message: message.unwrap_or_else(|| "Resource already exists".to_string()),
        },
        500 => ApiError::ServerError {
            status,
            message: message.unwrap_or_else(|| "Internal server error".to_string()),
        },
        _ => ApiError::Http {
            status,
            message: message.unwrap_or_else(|| format!("HTTP error! status: {}", status)),
        },
    };
    Err(error)
}
