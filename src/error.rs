use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Retry classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network hiccups, quota and rate limits. Worth another attempt.
    Transient,
    /// The remote side refused the request and will keep refusing it.
    Permanent,
    /// Bad input or a bug on our side. Retrying cannot help.
    Logic,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{context} returned HTTP {status}: {message}")]
    Remote {
        context: String,
        status: u16,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid dataset: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Date parse error: {0}")]
    Date(#[from] chrono::ParseError),
}

impl Error {
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn dataset(message: impl fmt::Display) -> Self {
        Self::Dataset(message.to_string())
    }

    /// Map a non-success HTTP response onto the error taxonomy. 401 is always
    /// an authentication failure.
    pub fn from_status(context: impl Into<String>, status: u16, body: &str) -> Self {
        let context = context.into();
        if status == 401 {
            return Self::Auth(format!("{context}: {}", truncate(body)));
        }
        Self::Remote {
            context,
            status,
            message: truncate(body).to_string(),
        }
    }

    pub fn kind(self: &Self) -> ErrorKind {
        match self {
            Self::Remote {
                status, message, ..
            } => status_kind(*status, message),
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_body() {
                    ErrorKind::Transient
                } else if e.is_decode() {
                    ErrorKind::Logic
                } else if let Some(status) = e.status() {
                    status_kind(status.as_u16(), "")
                } else {
                    ErrorKind::Transient
                }
            }
            Self::Auth(_) | Self::S3(_) | Self::Io(_) => ErrorKind::Permanent,
            Self::NotFound { .. }
            | Self::InvalidGeometry(_)
            | Self::Dataset(_)
            | Self::Config(_)
            | Self::Json(_)
            | Self::Toml(_)
            | Self::TomlSerialize(_)
            | Self::Csv(_)
            | Self::Url(_)
            | Self::Date(_) => ErrorKind::Logic,
        }
    }

    pub fn is_transient(self: &Self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Errors that must stop the whole batch, not just the current glacier.
    pub fn is_fatal(self: &Self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_not_found(self: &Self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn status_kind(status: u16, message: &str) -> ErrorKind {
    match status {
        408 | 429 | 500..=599 => ErrorKind::Transient,
        // Drive reports quota exhaustion as 403 with a rateLimitExceeded reason
        403 if message.contains("ateLimitExceeded") => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}

fn truncate(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(300)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(Error::from_status("drive", 503, "").is_transient());
        assert!(Error::from_status("drive", 429, "").is_transient());
        assert!(Error::from_status("drive", 403, "userRateLimitExceeded").is_transient());
        assert_eq!(
            Error::from_status("drive", 403, "insufficientPermissions").kind(),
            ErrorKind::Permanent
        );
        assert_eq!(
            Error::from_status("drive", 404, "").kind(),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn test_unauthorized_is_fatal() {
        let err = Error::from_status("drive", 401, "Invalid Credentials");
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_not_found_is_logic() {
        let err = Error::not_found("glacier", "G1");
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert_eq!(err.to_string(), "glacier not found: G1");
    }
}
