//! Error classification logic

use crate::error_code::{is_retriable_status, ErrorType, HttpErrorCategory};
use crate::transport::{FailureKind, TransportFailure};

const TIMEOUT_CODES: &[&str] = &["ETIMEDOUT", "ECONNABORTED", "ESOCKETTIMEDOUT", "ERR_CANCELED"];
const TIMEOUT_PHRASES: &[&str] = &["timeout", "timed out", "time out"];
const SERIALIZATION_PHRASES: &[&str] = &[
    "json",
    "parse",
    "serialize",
    "deserialize",
    "syntax error",
    "unexpected token",
];

/// Structured description of one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedError {
    pub error_type: ErrorType,
    pub is_retriable: bool,
    pub status_code: Option<u16>,
    pub category: Option<HttpErrorCategory>,
}

impl ClassifiedError {
    fn of(error_type: ErrorType, is_retriable: bool) -> Self {
        Self {
            error_type,
            is_retriable,
            status_code: None,
            category: None,
        }
    }
}

/// Classify a raw transport failure.
///
/// First match wins: timeout, serialization, http, network, unknown.
/// Serialization is only considered when no response arrived, so an error
/// body that happens to mention JSON stays an HTTP failure.
pub fn classify(failure: &TransportFailure) -> ClassifiedError {
    if is_timeout(failure) {
        return ClassifiedError::of(ErrorType::Timeout, true);
    }

    if failure.response.is_none() && is_serialization(failure) {
        return ClassifiedError::of(ErrorType::Serialization, false);
    }

    if let Some(response) = &failure.response {
        let status = response.status;
        return ClassifiedError {
            error_type: ErrorType::Http,
            is_retriable: is_retriable_status(status),
            status_code: Some(status),
            category: Some(classify_http_status(status)),
        };
    }

    if failure.request.is_some() {
        return ClassifiedError::of(ErrorType::Network, true);
    }

    ClassifiedError::of(ErrorType::Unknown, false)
}

/// Category for an HTTP status.
#[inline]
pub fn classify_http_status(status: u16) -> HttpErrorCategory {
    HttpErrorCategory::from_http_status(status)
}

fn is_timeout(failure: &TransportFailure) -> bool {
    if failure.timed_out {
        return true;
    }
    if let Some(code) = failure.code.as_deref() {
        if TIMEOUT_CODES.iter().any(|c| c.eq_ignore_ascii_case(code)) {
            return true;
        }
    }
    failure
        .message
        .as_deref()
        .map(|m| contains_any(m, TIMEOUT_PHRASES))
        .unwrap_or(false)
}

fn is_serialization(failure: &TransportFailure) -> bool {
    if matches!(
        failure.kind,
        Some(FailureKind::Syntax) | Some(FailureKind::TypeMismatch)
    ) {
        return true;
    }
    failure
        .message
        .as_deref()
        .map(|m| contains_any(m, SERIALIZATION_PHRASES))
        .unwrap_or(false)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}
