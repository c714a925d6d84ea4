//! One-shot generation and validation calls.
//!
//! Each call posts a single text field and returns a single text result. None
//! of them create an observable run.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Map, Value};

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    http::RequestOptions,
    identifiers::RunId,
};

/// Which field of the response produced [`Generated::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Code,
    Markdown,
    /// Neither `code` nor `markdown` was present; the text is the whole body, pretty-printed.
    Raw,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    pub format: OutputFormat,
    pub run_id: Option<RunId>,
}

impl Generated {
    pub(crate) fn from_value(value: &Value) -> Self {
        let run_id = value
            .get("run_id")
            .and_then(|v| v.as_str())
            .map(RunId::new)
            .filter(|id| !id.is_empty());
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if let Some(code) = field("code") {
            return Self {
                text: code,
                format: OutputFormat::Code,
                run_id,
            };
        }
        if let Some(markdown) = field("markdown") {
            return Self {
                text: markdown,
                format: OutputFormat::Markdown,
                run_id,
            };
        }
        Self {
            text: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            format: OutputFormat::Raw,
            run_id,
        }
    }
}

#[derive(Clone)]
pub struct GenerateClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl GenerateClient {
    /// Manual test cases from UI requirements.
    pub async fn manual_ui(&self, requirements: &str) -> Result<Generated> {
        self.post(&["generate", "manual", "ui"], "requirements", requirements)
            .await
    }

    /// Manual test cases from an OpenAPI document.
    pub async fn manual_api(&self, openapi: &str) -> Result<Generated> {
        self.post(&["generate", "manual", "api"], "openapi", openapi)
            .await
    }

    /// UI autotests from requirements.
    pub async fn autotests_ui(&self, requirements: &str) -> Result<Generated> {
        self.post(&["generate", "autotests", "ui"], "requirements", requirements)
            .await
    }

    /// API autotests from an OpenAPI document.
    pub async fn autotests_api(&self, openapi: &str) -> Result<Generated> {
        self.post(&["generate", "autotests", "api"], "openapi", openapi)
            .await
    }

    /// Check test code against the backend's standards.
    pub async fn validate(&self, code: &str) -> Result<Generated> {
        self.post(&["validate"], "code", code).await
    }

    async fn post(&self, segments: &[&str], field: &str, text: &str) -> Result<Generated> {
        if text.trim().is_empty() {
            return Err(Error::Validation(
                ValidationError::new("input is empty").with_field(field),
            ));
        }
        let mut body = Map::new();
        body.insert(field.to_string(), Value::String(text.to_string()));

        let builder = self
            .inner
            .request(Method::POST, segments)?
            .json(&Value::Object(body));
        let value: Value = self
            .inner
            .execute_json(builder, &RequestOptions::default())
            .await?;
        Ok(Generated::from_value(&value))
    }
}
