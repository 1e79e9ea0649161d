//! Request signatures and idempotency key generation.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Deterministic fingerprint of (method, resolved URL, body).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature(String);

impl RequestSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("request body cannot be serialized deterministically: {0}")]
    Body(#[from] serde_json::Error),
}

/// Compute the signature of a request.
///
/// The body is canonicalised (object keys sorted) before hashing, so equal
/// bodies always give equal signatures. A body that fails to serialize is an
/// error, never a fallback signature.
pub fn signature_of<B>(method: &str, url: &str, body: Option<&B>) -> Result<RequestSignature, SignatureError>
where
    B: Serialize + ?Sized,
{
    let canonical = match body {
        Some(b) => {
            let value = serde_json::to_value(b)?;
            let mut out = String::new();
            write_canonical(&value, &mut out);
            out
        }
        None => String::new(),
    };
    Ok(signature_from_canonical(method, url, &canonical))
}

/// Signature of an already serialized JSON body.
pub fn signature_of_value(method: &str, url: &str, body: Option<&Value>) -> RequestSignature {
    let mut canonical = String::new();
    if let Some(v) = body {
        write_canonical(v, &mut canonical);
    }
    signature_from_canonical(method, url, &canonical)
}

fn signature_from_canonical(method: &str, url: &str, canonical: &str) -> RequestSignature {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();
    RequestSignature(format!("{} {} {}", method.to_ascii_uppercase(), url, digest))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*k).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*k) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Source of fresh idempotency keys.
#[derive(Clone)]
pub struct KeyGenerator(Arc<dyn Fn() -> String + Send + Sync>);

impl KeyGenerator {
    /// Nanosecond timestamp plus a process-wide counter; unique for the process lifetime.
    pub fn sequential() -> Self {
        Self(Arc::new(|| {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            let n = KEY_COUNTER.fetch_add(1, Ordering::Relaxed);
            format!("idem-{:x}-{:x}", nanos, n)
        }))
    }

    /// Random v4 UUIDs.
    pub fn uuid() -> Self {
        Self(Arc::new(|| uuid::Uuid::new_v4().to_string()))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn generate(&self) -> String {
        (self.0)()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::sequential()
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyGenerator(..)")
    }
}
