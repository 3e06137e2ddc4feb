use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic handling by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Credential errors
    AuthenticationRequired,

    // Client-side request errors
    InvalidRequest,
    Conflict,

    // Server-side errors
    ServerError,
    InvalidResponse,
    ProtocolError,
    HttpStatus,
    Unsuccessful,

    // Local errors
    Encode,
    Transport,
    Storage,
    Config,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_str = match self {
            ErrorCode::AuthenticationRequired => "authentication_required",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Conflict => "conflict",
            ErrorCode::ServerError => "server_error",
            ErrorCode::InvalidResponse => "invalid_response",
            ErrorCode::ProtocolError => "protocol_error",
            ErrorCode::HttpStatus => "http_status",
            ErrorCode::Unsuccessful => "unsuccessful",
            ErrorCode::Encode => "encode",
            ErrorCode::Transport => "transport",
            ErrorCode::Storage => "storage",
            ErrorCode::Config => "config",
        };
        write!(f, "{}", code_str)
    }
}

/// Well-known validation failures the server reports with a 400.
///
/// The server's wording has drifted between releases, so callers get a
/// stable message for these instead of the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KnownCause {
    IncorrectPin,
    IncorrectPassword,
    InvalidOtp,
    InsufficientBalance,
}

impl KnownCause {
    /// Lowercase substrings of server messages that identify each cause.
    /// Checked in declaration order.
    const PATTERNS: &'static [(KnownCause, &'static [&'static str])] = &[
        (
            KnownCause::IncorrectPin,
            &["pin is incorrect", "incorrect pin", "invalid pin", "wrong pin"],
        ),
        (
            KnownCause::IncorrectPassword,
            &[
                "password is incorrect",
                "incorrect password",
                "invalid password",
                "wrong password",
            ],
        ),
        (
            KnownCause::InvalidOtp,
            &[
                "invalid or expired otp",
                "otp has expired",
                "otp expired",
                "invalid otp",
            ],
        ),
        (
            KnownCause::InsufficientBalance,
            &["insufficient balance", "insufficient funds", "insufficient wallet"],
        ),
    ];

    /// Match a server message against the known causes
    pub fn from_server_message(message: &str) -> Option<Self> {
        let lowered = message.to_lowercase();
        Self::PATTERNS
            .iter()
            .find(|(_, needles)| needles.iter().any(|needle| lowered.contains(needle)))
            .map(|(cause, _)| *cause)
    }

    /// The stable, user-facing message for this cause
    pub fn message(&self) -> &'static str {
        match self {
            KnownCause::IncorrectPin => "The PIN you entered is incorrect",
            KnownCause::IncorrectPassword => "The password you entered is incorrect",
            KnownCause::InvalidOtp => "Invalid or expired OTP. Please request a new code",
            KnownCause::InsufficientBalance => "Insufficient wallet balance for this transaction",
        }
    }
}

/// Errors surfaced by the API client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 401 that could not be recovered by a refresh
    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    /// 400, optionally refined into a known cause
    #[error("{message}")]
    InvalidRequest {
        message: String,
        cause: Option<KnownCause>,
    },

    /// 409, resource already exists
    #[error("{message}")]
    Conflict { message: String },

    /// 500
    #[error("{message}")]
    ServerError { status: u16, message: String },

    /// 2xx whose body is not the expected JSON
    #[error("Invalid response from server: {reason}")]
    InvalidResponse { status: u16, reason: String },

    /// Non-2xx whose body is not JSON at all
    #[error("Server error: {status}")]
    Protocol { status: u16 },

    /// Any other non-2xx status
    #[error("{message}")]
    Http { status: u16, message: String },

    /// 2xx envelope reporting `success: false`
    #[error("{message}")]
    Unsuccessful { message: String },

    /// The request body could not be serialized
    #[error("Failed to encode request body: {0}")]
    Encode(String),

    /// The HTTP call itself failed
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Build an authentication error with the given message
    pub fn authentication_required(message: impl Into<String>) -> Self {
        ApiError::AuthenticationRequired {
            message: message.into(),
        }
    }

    /// Build a transport error from any displayable cause
    pub fn transport(err: impl fmt::Display) -> Self {
        ApiError::Transport(err.to_string())
    }

    /// Build a storage error from any displayable cause
    pub fn storage(err: impl fmt::Display) -> Self {
        ApiError::Storage(err.to_string())
    }

    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::AuthenticationRequired { .. } => ErrorCode::AuthenticationRequired,
            ApiError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            ApiError::Conflict { .. } => ErrorCode::Conflict,
            ApiError::ServerError { .. } => ErrorCode::ServerError,
            ApiError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            ApiError::Protocol { .. } => ErrorCode::ProtocolError,
            ApiError::Http { .. } => ErrorCode::HttpStatus,
            ApiError::Unsuccessful { .. } => ErrorCode::Unsuccessful,
            ApiError::Encode(_) => ErrorCode::Encode,
            ApiError::Transport(_) => ErrorCode::Transport,
            ApiError::Storage(_) => ErrorCode::Storage,
            ApiError::Config(_) => ErrorCode::Config,
        }
    }

    /// HTTP status of the response that produced this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthenticationRequired { .. } => Some(401),
            ApiError::InvalidRequest { .. } => Some(400),
            ApiError::Conflict { .. } => Some(409),
            ApiError::ServerError { status, .. }
            | ApiError::InvalidResponse { status, .. }
            | ApiError::Protocol { status }
            | ApiError::Http { status, .. } => Some(*status),
            ApiError::Unsuccessful { .. }
            | ApiError::Encode(_)
            | ApiError::Transport(_)
            | ApiError::Storage(_)
            | ApiError::Config(_) => None,
        }
    }

    /// Whether this is a 401 / "unauthorized" signal
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::AuthenticationRequired { .. })
    }

    /// Whether retrying the same call later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) | ApiError::ServerError { .. } | ApiError::Protocol { .. } => {
                true
            }
            ApiError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// The refined cause of a 400, if the server message was recognised
    pub fn known_cause(&self) -> Option<KnownCause> {
        match self {
            ApiError::InvalidRequest { cause, .. } => *cause,
            _ => None,
        }
    }
}

/// Result type for API client operations
pub type ApiResult<T> = Result<T, ApiError>;
