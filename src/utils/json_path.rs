//! Dot-path lookup into JSON values.
//!
//! Supports nested keys (`error.detail.message`), bracket indexing
//! (`errors[0].message`), dot indexing (`errors.0.message`) and an optional
//! leading `$.`.

use serde_json::Value;

pub struct PathMapper;

impl PathMapper {
    /// Value at `path`, or `None` if any segment is missing.
    pub fn get_path<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
        let normalized = path.trim().trim_start_matches("$.");
        if normalized.is_empty() {
            return None;
        }

        let mut current = obj;
        for part in normalized.split('.') {
            if part.is_empty() {
                return None;
            }

            if let Some(bracket_pos) = part.find('[') {
                let key = &part[..bracket_pos];
                if !key.is_empty() {
                    current = current.as_object()?.get(key)?;
                }
                // "a[0][1]" style chains
                for idx in part[bracket_pos..].split('[').skip(1) {
                    let idx = idx.strip_suffix(']')?;
                    current = index(current, idx)?;
                }
            } else {
                current = match current {
                    Value::Object(map) => map.get(part)?,
                    Value::Array(_) => index(current, part)?,
                    _ => return None,
                };
            }
        }

        Some(current)
    }

    /// String at `path`. Non-string scalars are rendered as JSON; null and
    /// empty strings count as absent.
    pub fn get_string(obj: &Value, path: &str) -> Option<String> {
        match Self::get_path(obj, path)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => serde_json::to_string(other).ok(),
        }
    }
}

fn index<'a>(value: &'a Value, idx: &str) -> Option<&'a Value> {
    let arr = value.as_array()?;
    if idx == "*" {
        return arr.first();
    }
    arr.get(idx.parse::<usize>().ok()?)
}
