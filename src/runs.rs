use std::sync::Arc;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{
    client::ClientInner,
    errors::{Error, Result, ValidationError},
    http::RequestOptions,
    identifiers::{ModelId, RunId},
    types::{Run, RunArtifacts, RunRef},
};

/// Body of `POST /runs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub requirements: String,
    pub openapi: String,
    /// Sent as `""` when no model is selected.
    #[serde(default, serialize_with = "blank_when_none")]
    pub model: Option<ModelId>,
}

impl RunRequest {
    pub fn new(requirements: impl Into<String>, openapi: impl Into<String>) -> Self {
        Self {
            requirements: requirements.into(),
            openapi: openapi.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<ModelId>) -> Self {
        let model = model.into();
        self.model = if model.is_empty() { None } else { Some(model) };
        self
    }
}

fn blank_when_none<S>(
    model: &Option<ModelId>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(model.as_ref().map_or("", ModelId::as_str))
}

#[derive(Deserialize)]
struct RunsCreateResponse {
    #[serde(default)]
    run_id: Option<RunId>,
}

#[derive(Deserialize)]
struct RunsListResponse {
    #[serde(default)]
    runs: Option<Vec<Value>>,
}

#[derive(Clone)]
pub struct RunsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl RunsClient {
    /// `GET /runs`. A body without a `runs` list reads as empty; entries
    /// that are neither an id nor a run record are skipped.
    pub async fn list(&self) -> Result<Vec<RunRef>> {
        let builder = self.inner.request(Method::GET, &["runs"])?;
        let resp: RunsListResponse = self
            .inner
            .execute_json(builder, &RequestOptions::default())
            .await?;
        Ok(resp
            .runs
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| match RunRef::from_value(entry) {
                Ok(run) => Some(run),
                Err(_reason) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(reason = %_reason, "skipping run entry");
                    None
                }
            })
            .collect())
    }

    /// `POST /runs`; returns the identifier the backend assigned.
    pub async fn create(&self, req: &RunRequest) -> Result<RunId> {
        self.create_with_options(req, RequestOptions::default())
            .await
    }

    pub async fn create_with_options(
        &self,
        req: &RunRequest,
        options: RequestOptions,
    ) -> Result<RunId> {
        let builder = self.inner.request(Method::POST, &["runs"])?.json(req);
        let resp: RunsCreateResponse = self.inner.execute_json(builder, &options).await?;
        resp.run_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            Error::Validation(
                ValidationError::new("response is missing run_id").with_field("run_id"),
            )
        })
    }

    /// `GET /runs/{id}`: every file of the run, keyed by relative path.
    pub async fn files(&self, run_id: &RunId) -> Result<RunArtifacts> {
        require_run_id(run_id)?;
        let builder = self
            .inner
            .request(Method::GET, &["runs", run_id.as_str()])?;
        self.inner
            .execute_json(builder, &RequestOptions::default())
            .await
    }

    /// Current snapshot of the run, read from its `run.json`.
    ///
    /// `Ok(None)` when the backend has not written `run.json` yet.
    pub async fn fetch(&self, run_id: &RunId) -> Result<Option<Run>> {
        let artifacts = self.files(run_id).await?;
        match artifacts.run() {
            Some(parsed) => Ok(Some(parsed?)),
            None => Ok(None),
        }
    }

    /// Link target for the zipped artifacts of `run_id`. No request is made.
    pub fn download_url(&self, run_id: &RunId) -> Result<Url> {
        require_run_id(run_id)?;
        self.inner
            .endpoint(&["runs", run_id.as_str(), "download"])
    }
}

fn require_run_id(run_id: &RunId) -> Result<()> {
    if run_id.is_empty() {
        return Err(Error::Validation(
            ValidationError::new("run_id is required").with_field("run_id"),
        ));
    }
    Ok(())
}
