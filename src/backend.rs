//! The backend operations the run tracker depends on.
//!
//! [`Client`] is the production implementation; `MockBackend` (feature
//! `mock`) is an in-memory one for tests.

use std::{future::Future, pin::Pin};

use crate::{
    errors::Result,
    identifiers::{ModelId, RunId},
    runs::RunRequest,
    types::{Run, RunRef},
    Client,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait PipelineBackend: Send + Sync + 'static {
    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelId>>>;

    fn list_runs(&self) -> BoxFuture<'_, Result<Vec<RunRef>>>;

    fn submit_run<'a>(&'a self, request: &'a RunRequest) -> BoxFuture<'a, Result<RunId>>;

    /// Latest snapshot of `id`; `Ok(None)` when the backend has none to give.
    fn fetch_run<'a>(&'a self, id: &'a RunId) -> BoxFuture<'a, Result<Option<Run>>>;

    fn download_url(&self, id: &RunId) -> Option<String>;
}

impl PipelineBackend for Client {
    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelId>>> {
        Box::pin(async move { self.models().list().await })
    }

    fn list_runs(&self) -> BoxFuture<'_, Result<Vec<RunRef>>> {
        Box::pin(async move { self.runs().list().await })
    }

    fn submit_run<'a>(&'a self, request: &'a RunRequest) -> BoxFuture<'a, Result<RunId>> {
        Box::pin(async move { self.runs().create(request).await })
    }

    fn fetch_run<'a>(&'a self, id: &'a RunId) -> BoxFuture<'a, Result<Option<Run>>> {
        Box::pin(async move { self.runs().fetch(id).await })
    }

    fn download_url(&self, id: &RunId) -> Option<String> {
        self.runs().download_url(id).ok().map(String::from)
    }
}
