use crate::error_code::{codes, ErrorType, HttpErrorCategory};
use crate::transport::ResponseBody;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;
use thiserror::Error;

/// Boxed error used as the wrapped cause of typed errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error context for failures raised before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "path_params.id", "retry.delay_factor_ms")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "path_resolver", "client_builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Diagnostic snapshot of the request a failure belongs to.
///
/// Also handed to retry predicates and observers, so it reflects the retry
/// count at the time of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    pub method: String,
    /// Fully resolved URL (base URL + substituted path).
    pub url: String,
    pub base_url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub timestamp: SystemTime,
    pub retry_count: u32,
    pub client_name: String,
}

/// Unified error type for request execution.
///
/// The first four variants are the typed failure kinds a caller matches on;
/// each carries a machine-readable [`Error::code`], a retriability flag
/// consistent with what the retry engine decided, request metadata and the
/// wrapped cause.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: &'static str,
        is_retriable: bool,
        metadata: Box<RequestMetadata>,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Timeout error: {message}")]
    Timeout {
        message: String,
        is_retriable: bool,
        metadata: Box<RequestMetadata>,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        is_retriable: bool,
        metadata: Box<RequestMetadata>,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("HTTP {status} ({category}): {message}")]
    Http {
        status: u16,
        status_text: String,
        category: HttpErrorCategory,
        message: String,
        body: ResponseBody,
        is_retriable: bool,
        metadata: Box<RequestMetadata>,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Request cancelled: {} {}", .metadata.method, .metadata.url)]
    Cancelled { metadata: Box<RequestMetadata> },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Network { code, .. } => *code,
            Error::Timeout { .. } => codes::TIMEOUT_ERROR,
            Error::Serialization { .. } => codes::SERIALIZATION_ERROR,
            Error::Http { .. } => codes::HTTP_ERROR,
            Error::Cancelled { .. } => codes::CANCELLED,
            Error::Validation { .. } => codes::VALIDATION_ERROR,
            Error::Configuration { .. } => codes::CONFIGURATION_ERROR,
        }
    }

    /// Whether the failure was considered retriable when it was raised.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Network { is_retriable, .. }
            | Error::Timeout { is_retriable, .. }
            | Error::Serialization { is_retriable, .. }
            | Error::Http { is_retriable, .. } => *is_retriable,
            Error::Cancelled { .. } | Error::Validation { .. } | Error::Configuration { .. } => {
                false
            }
        }
    }

    /// The classification this error was built from, for typed kinds.
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            Error::Network { code, .. } if *code == codes::UNKNOWN_ERROR => Some(ErrorType::Unknown),
            Error::Network { .. } => Some(ErrorType::Network),
            Error::Timeout { .. } => Some(ErrorType::Timeout),
            Error::Serialization { .. } => Some(ErrorType::Serialization),
            Error::Http { .. } => Some(ErrorType::Http),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&RequestMetadata> {
        match self {
            Error::Network { metadata, .. }
            | Error::Timeout { metadata, .. }
            | Error::Serialization { metadata, .. }
            | Error::Http { metadata, .. }
            | Error::Cancelled { metadata } => Some(metadata),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<HttpErrorCategory> {
        match self {
            Error::Http { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. } | Error::Configuration { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
