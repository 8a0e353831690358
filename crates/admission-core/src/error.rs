//! Shared error type across policy-admission crates.

use thiserror::Error;

/// Stable error codes, used for HTTP status mapping and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed review body or object.
    BadRequest,
    /// Configuration rejected at load time.
    InvalidConfig,
    /// Unsupported configuration version.
    UnsupportedVersion,
    /// A looked-up object does not exist.
    NotFound,
    /// An external collaborator (cluster API, DNS) failed.
    Unavailable,
    /// Internal fault.
    Internal,
}

impl ErrorCode {
    /// String representation used in responses and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Unified error type used by core and engine.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            AdmissionError::BadRequest(_) => ErrorCode::BadRequest,
            AdmissionError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            AdmissionError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            AdmissionError::NotFound { .. } => ErrorCode::NotFound,
            AdmissionError::Unavailable(_) => ErrorCode::Unavailable,
            AdmissionError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn namespace_not_found(name: impl Into<String>) -> Self {
        AdmissionError::NotFound {
            kind: "namespace",
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = AdmissionError::namespace_not_found("team-a");
        assert_eq!(err.to_string(), "namespace \"team-a\" not found");
        assert_eq!(err.code().as_str(), "NOT_FOUND");
    }
}
