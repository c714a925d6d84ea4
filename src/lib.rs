//! Async client for the TestOps test-generation pipeline.
//!
//! Submits pipeline runs, follows them until every step settles, and derives
//! what a front end needs to render them.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Default value of the client identification header.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("testops-rust/", env!("CARGO_PKG_VERSION"));

/// HTTP header carrying the client identification.
pub const CLIENT_HEADER: &str = "X-TestOps-Client";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between two fetches of a run that has not settled yet.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

mod backend;
mod client;
pub mod dashboard;
mod errors;
mod generate;
mod http;
mod identifiers;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod models;
mod registry;
mod runs;
mod sync;
mod telemetry;
mod types;
pub mod view;

pub use backend::{BoxFuture, PipelineBackend};
pub use client::{Client, Config};
pub use errors::{APIError, Error, Result, TransportError, TransportErrorKind, ValidationError};
pub use generate::{GenerateClient, Generated, OutputFormat};
pub use http::{HeaderEntry, HeaderList, RequestOptions};
pub use identifiers::{ModelId, RunId};
#[cfg(feature = "mock")]
pub use mock::{MockBackend, MockConfig, MockFetch};
pub use models::ModelsClient;
pub use registry::RunRegistry;
pub use runs::{RunRequest, RunsClient};
pub use sync::{
    Backoff, PollPolicy, SubmitError, SyncPhase, SyncState, Synchronizer, RUN_FAILED_TO_START,
};
pub use telemetry::{HttpRequestMetrics, MetricsCallbacks, RequestContext};
pub use types::{
    Run, RunArtifacts, RunFiles, RunInput, RunRef, Step, StepArtifact, StepName, StepStatus,
    ERROR_FILE, RUN_FILE,
};
