//! In-memory [`PipelineBackend`] for offline tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    backend::{BoxFuture, PipelineBackend},
    errors::{APIError, Error, Result, TransportError, TransportErrorKind},
    identifiers::{ModelId, RunId},
    runs::RunRequest,
    types::{Run, RunRef},
};

/// One scripted answer to a run fetch.
#[derive(Debug, Clone)]
pub enum MockFetch {
    Snapshot(Run),
    /// The listing exists but carries no `run.json`.
    Missing,
    /// Transport failure with the given message.
    Fail(String),
}

#[derive(Debug, Default)]
struct ScriptedRun {
    outcomes: VecDeque<MockFetch>,
    delay: Duration,
}

/// Scripted responses for a [`MockBackend`].
///
/// Fetch outcomes are consumed in order per run; the last one repeats.
#[derive(Debug, Default)]
pub struct MockConfig {
    pub models: Vec<ModelId>,
    pub runs: Vec<RunRef>,
    pub fail_listings: bool,
    pub submissions: VecDeque<Result<RunId>>,
    fetches: HashMap<RunId, ScriptedRun>,
}

impl MockConfig {
    pub fn with_models<I, M>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModelId>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_runs(mut self, runs: Vec<RunRef>) -> Self {
        self.runs = runs;
        self
    }

    /// Make both `list_models` and `list_runs` fail.
    pub fn with_listing_failure(mut self) -> Self {
        self.fail_listings = true;
        self
    }

    pub fn with_submission(mut self, id: impl Into<RunId>) -> Self {
        self.submissions.push_back(Ok(id.into()));
        self
    }

    pub fn with_submission_error(mut self, err: Error) -> Self {
        self.submissions.push_back(Err(err));
        self
    }

    pub fn with_fetches(mut self, id: impl Into<RunId>, outcomes: Vec<MockFetch>) -> Self {
        self.fetches.entry(id.into()).or_default().outcomes.extend(outcomes);
        self
    }

    /// Every fetch of `id` takes `delay` before it answers.
    pub fn with_fetch_delay(mut self, id: impl Into<RunId>, delay: Duration) -> Self {
        self.fetches.entry(id.into()).or_default().delay = delay;
        self
    }
}

#[derive(Clone)]
pub struct MockBackend {
    inner: Arc<MockInner>,
}

struct MockInner {
    models: Vec<ModelId>,
    runs: Vec<RunRef>,
    fail_listings: bool,
    submissions: Mutex<VecDeque<Result<RunId>>>,
    fetches: Mutex<HashMap<RunId, ScriptedRun>>,
    fetch_counts: Mutex<HashMap<RunId, usize>>,
    submitted: Mutex<Vec<RunRequest>>,
}

impl MockBackend {
    pub fn new(cfg: MockConfig) -> Self {
        Self {
            inner: Arc::new(MockInner {
                models: cfg.models,
                runs: cfg.runs,
                fail_listings: cfg.fail_listings,
                submissions: Mutex::new(cfg.submissions),
                fetches: Mutex::new(cfg.fetches),
                fetch_counts: Mutex::new(HashMap::new()),
                submitted: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fetches issued for `id` so far, counted when they start.
    pub fn fetch_count(&self, id: impl Into<RunId>) -> usize {
        let id = id.into();
        self.inner
            .fetch_counts
            .lock()
            .expect("lock poisoned")
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<RunRequest> {
        self.inner.submitted.lock().expect("lock poisoned").clone()
    }

    fn listing_error() -> Error {
        Error::Transport(TransportError {
            kind: TransportErrorKind::Connect,
            message: "mock listing unavailable".to_string(),
            source: None,
        })
    }

    fn next_fetch(&self, id: &RunId) -> (Duration, Option<MockFetch>) {
        *self
            .inner
            .fetch_counts
            .lock()
            .expect("lock poisoned")
            .entry(id.clone())
            .or_insert(0) += 1;

        let mut fetches = self.inner.fetches.lock().expect("lock poisoned");
        let Some(script) = fetches.get_mut(id) else {
            return (Duration::ZERO, None);
        };
        let outcome = if script.outcomes.len() > 1 {
            script.outcomes.pop_front()
        } else {
            script.outcomes.front().cloned()
        };
        (script.delay, outcome)
    }
}

impl PipelineBackend for MockBackend {
    fn list_models(&self) -> BoxFuture<'_, Result<Vec<ModelId>>> {
        Box::pin(async move {
            if self.inner.fail_listings {
                return Err(Self::listing_error());
            }
            Ok(self.inner.models.clone())
        })
    }

    fn list_runs(&self) -> BoxFuture<'_, Result<Vec<RunRef>>> {
        Box::pin(async move {
            if self.inner.fail_listings {
                return Err(Self::listing_error());
            }
            Ok(self.inner.runs.clone())
        })
    }

    fn submit_run<'a>(&'a self, request: &'a RunRequest) -> BoxFuture<'a, Result<RunId>> {
        Box::pin(async move {
            self.inner
                .submitted
                .lock()
                .expect("lock poisoned")
                .push(request.clone());
            self.inner
                .submissions
                .lock()
                .expect("lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(Error::Validation("no mock submission queued".into())))
        })
    }

    fn fetch_run<'a>(&'a self, id: &'a RunId) -> BoxFuture<'a, Result<Option<Run>>> {
        Box::pin(async move {
            let (delay, outcome) = self.next_fetch(id);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                Some(MockFetch::Snapshot(run)) => Ok(Some(run)),
                Some(MockFetch::Missing) => Ok(None),
                Some(MockFetch::Fail(message)) => Err(Error::Transport(TransportError {
                    kind: TransportErrorKind::Connect,
                    message,
                    source: None,
                })),
                None => Err(Error::Api(
                    APIError::new(404, "Not Found").with_detail("Run not found"),
                )),
            }
        })
    }

    fn download_url(&self, id: &RunId) -> Option<String> {
        if id.is_empty() {
            return None;
        }
        Some(format!("mock://runs/{id}/download"))
    }
}
