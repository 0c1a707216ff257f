//! Structural checks on raw JSON responses.
//!
//! Paths are dotted field names with optional `[i]` indices:
//! `name`, `main.temp`, `weather[0].description`, `[0].lat`. A plain field
//! name applied to a list looks inside the list's first element.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralError {
    #[error("response is not valid JSON: {0}")]
    Malformed(String),

    #[error("missing required field(s): {}", .0.join(", "))]
    Missing(Vec<String>),
}

impl StructuralError {
    /// Paths reported missing, empty for malformed bodies.
    pub fn missing_paths(&self) -> &[String] {
        match self {
            Self::Missing(paths) => paths,
            Self::Malformed(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(open) => (&part[..open], &part[open..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            out.push(Segment::Key(name));
        }
        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest.get(1..close)?.parse().ok()?;
            out.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Some(out)
}

/// Resolve `path` inside `value`. `null` leaves count as absent.
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in segments(path)? {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Key(key), Value::Array(items)) => items.first()?.get(key)?,
            (Segment::Index(i), Value::Array(items)) => items.get(i)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Parse a response body into JSON.
pub fn parse(body: &[u8]) -> Result<Value, StructuralError> {
    serde_json::from_slice(body).map_err(|e| StructuralError::Malformed(e.to_string()))
}

/// Check that every required path is present.
///
/// # Errors
/// `StructuralError::Missing` naming every absent path.
pub fn check<'v>(raw: &'v Value, required_paths: &[&str]) -> Result<&'v Value, StructuralError> {
    let missing: Vec<String> = required_paths
        .iter()
        .filter(|path| lookup(raw, path).is_none())
        .map(|path| path.to_string())
        .collect();

    if missing.is_empty() {
        Ok(raw)
    } else {
        tracing::warn!("API response missing required fields: {:?}", missing);
        Err(StructuralError::Missing(missing))
    }
}
