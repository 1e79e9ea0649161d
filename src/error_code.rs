//! Error taxonomy: failure types, HTTP status categories and machine-readable codes.
//!
//! Every failure surfaced by the executor carries one [`ErrorType`]; failures
//! where the remote endpoint answered additionally carry an [`HttpErrorCategory`].
//!
//! ## HTTP categories
//!
//! | Category         | Statuses        | Retriable by default |
//! |------------------|-----------------|----------------------|
//! | `AUTHENTICATION` | 401, 403        | no                   |
//! | `NOT_FOUND`      | 404             | no                   |
//! | `RATE_LIMIT`     | 429             | yes                  |
//! | `VALIDATION`     | 400, 422        | no                   |
//! | `CLIENT_ERROR`   | other 4xx       | no (408 is)          |
//! | `SERVER_ERROR`   | 5xx             | yes                  |
//!
//! ## Example
//!
//! ```rust
//! use resilient_http::error_code::HttpErrorCategory;
//!
//! let category = HttpErrorCategory::from_http_status(429);
//! assert_eq!(category.as_str(), "RATE_LIMIT");
//! assert!(category.retriable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable codes reported by [`crate::Error::code`].
pub mod codes {
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
    pub const CANCELLED: &str = "CANCELLED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
}

/// Coarse kind of a failed request, decided by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Connection attempted, no reply received.
    Network,
    Timeout,
    /// Request or response could not be encoded/decoded.
    Serialization,
    /// Remote endpoint answered with an error status.
    Http,
    Unknown,
}

impl ErrorType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Serialization => "serialization",
            Self::Http => "http",
            Self::Unknown => "unknown",
        }
    }

    /// Code used by the typed error built from this classification.
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network => codes::NETWORK_ERROR,
            Self::Timeout => codes::TIMEOUT_ERROR,
            Self::Serialization => codes::SERIALIZATION_ERROR,
            Self::Http => codes::HTTP_ERROR,
            Self::Unknown => codes::UNKNOWN_ERROR,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of an HTTP error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpErrorCategory {
    /// 401 / 403
    Authentication,
    /// 404
    NotFound,
    /// 429
    RateLimit,
    /// 400 / 422
    Validation,
    /// Any other 4xx, and the fallback for non-error statuses
    ClientError,
    /// 5xx
    ServerError,
}

impl HttpErrorCategory {
    /// Maps a status code to its category.
    ///
    /// Specific statuses are checked before the generic 4xx/5xx ranges, so 429
    /// lands in `RateLimit` even though it is a client-range status.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            404 => Self::NotFound,
            429 => Self::RateLimit,
            400 | 422 => Self::Validation,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }

    /// Returns the canonical name (e.g. `"RATE_LIMIT"`).
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AUTHENTICATION",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimit => "RATE_LIMIT",
            Self::Validation => "VALIDATION",
            Self::ClientError => "CLIENT_ERROR",
            Self::ServerError => "SERVER_ERROR",
        }
    }

    /// Whether failures in this category are retried by default.
    ///
    /// Status 408 is retriable regardless of category; see
    /// [`is_retriable_status`].
    #[inline]
    pub fn retriable(&self) -> bool {
        matches!(self, Self::ServerError | Self::RateLimit)
    }

    /// Parses a canonical name; case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AUTHENTICATION" => Some(Self::Authentication),
            "NOT_FOUND" => Some(Self::NotFound),
            "RATE_LIMIT" => Some(Self::RateLimit),
            "VALIDATION" => Some(Self::Validation),
            "CLIENT_ERROR" => Some(Self::ClientError),
            "SERVER_ERROR" => Some(Self::ServerError),
            _ => None,
        }
    }
}

impl fmt::Display for HttpErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default retriability of an HTTP error status.
#[inline]
pub fn is_retriable_status(status: u16) -> bool {
    status == 408 || HttpErrorCategory::from_http_status(status).retriable()
}
