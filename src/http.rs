use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::errors::{APIError, Error};

/// Per-call request options.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub headers: HeaderList,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push(HeaderEntry::new(key.into(), value.into()));
        self
    }

    /// Override the overall request timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Structured header list with validation.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only whitespace.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

/// Build an [`Error::Api`] from a non-2xx status and its body.
pub(crate) fn parse_api_error_parts(status: StatusCode, body: String) -> Error {
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.trim().is_empty() {
        return APIError::new(status_code, status_text).into();
    }

    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        if let Some(detail) = value.get("detail").and_then(detail_text) {
            let mut err = APIError::new(status_code, status_text).with_detail(detail);
            err.raw_body = Some(body);
            return err.into();
        }
        if let Some(message) = value.get("message").and_then(|v| v.as_str()) {
            let mut err = APIError::new(status_code, message);
            err.raw_body = Some(body);
            return err.into();
        }
    }

    APIError {
        status: status_code,
        detail: None,
        message: body.clone(),
        raw_body: Some(body),
    }
    .into()
}

/// Render a `detail` value as one line of text.
///
/// Strings pass through. Lists of `{loc, msg}` validation issues become
/// `loc.path: msg` entries joined by `; `.
fn detail_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    let msg = item.get("msg").and_then(|v| v.as_str())?;
                    let loc = item
                        .get("loc")
                        .and_then(|v| v.as_array())
                        .map(|segments| {
                            segments
                                .iter()
                                .map(|s| match s {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(".")
                        })
                        .filter(|loc| !loc.is_empty());
                    Some(match loc {
                        Some(loc) => format!("{loc}: {msg}"),
                        None => msg.to_string(),
                    })
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
