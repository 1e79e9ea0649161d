//! `:name` path-parameter substitution.

use crate::{Error, ErrorContext, Result};
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::{Captures, Regex};
use std::collections::BTreeMap;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid"));

/// Characters left unescaped in a path segment value (same set as URI component encoding).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Replace every `:name` placeholder in `template` with its percent-encoded value.
///
/// A placeholder without a value is an error; unused values are ignored. In an
/// absolute URL only the part after the authority is scanned, so ports and
/// credentials are left alone.
pub fn resolve_path(template: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let split = path_start(template);
    let (head, tail) = template.split_at(split);

    let mut missing: Option<String> = None;
    let resolved = PLACEHOLDER.replace_all(tail, |caps: &Captures<'_>| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => utf8_percent_encode(value, SEGMENT).to_string(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });

    if let Some(name) = missing {
        return Err(Error::validation_with_context(
            format!("missing value for path parameter '{}' in '{}'", name, template),
            ErrorContext::new()
                .with_field_path(format!("path_params.{}", name))
                .with_source("path_resolver"),
        ));
    }
    Ok(format!("{}{}", head, resolved))
}

fn path_start(template: &str) -> usize {
    match template.find("://") {
        Some(scheme_end) => {
            let after = scheme_end + 3;
            template[after..].find('/').map(|i| after + i).unwrap_or(template.len())
        }
        None => 0,
    }
}

/// Join a base URL and a resolved path. Absolute paths are returned as is.
pub fn join_url(base_url: Option<&str>, path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }
    match base_url {
        Some(base) if !base.is_empty() => {
            let base = base.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            if path.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base, path)
            }
        }
        _ => path.to_string(),
    }
}
