//! Application state behind a pipeline front end.
//!
//! Holds the user's inputs, the model choice, the active tab and the last
//! error, and wires them to a [`Synchronizer`] and its [`RunRegistry`].

use std::sync::Arc;

use crate::{
    backend::PipelineBackend,
    errors::Error,
    generate::Generated,
    identifiers::{ModelId, RunId},
    registry::RunRegistry,
    runs::RunRequest,
    sync::{PollPolicy, SubmitError, SyncPhase, SyncState, Synchronizer},
    types::RunRef,
    view::RunView,
};

/// Notice shown when the model listing cannot be loaded.
pub const MODELS_LOAD_FAILED: &str = "Failed to load models";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Pipeline,
    /// One-shot generation output, set through [`Dashboard::show_generated`].
    Generate,
    History,
}

pub struct Dashboard<B: PipelineBackend> {
    sync: Synchronizer<B>,
    requirements: String,
    openapi: String,
    models: Vec<ModelId>,
    model: Option<ModelId>,
    tab: Tab,
    error: Option<String>,
    generated: Option<Generated>,
}

/// Snapshot of everything a front end draws.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub tab: Tab,
    pub models: Vec<ModelId>,
    pub model: Option<ModelId>,
    pub error: Option<String>,
    pub generated: Option<Generated>,
    pub history: Vec<RunRef>,
    pub phase: SyncPhase,
    pub run: RunView,
}

impl<B: PipelineBackend> Dashboard<B> {
    pub fn new(backend: Arc<B>, policy: PollPolicy) -> Self {
        Self::from_synchronizer(Synchronizer::new(backend, policy))
    }

    pub fn from_synchronizer(sync: Synchronizer<B>) -> Self {
        Self {
            sync,
            requirements: String::new(),
            openapi: String::new(),
            models: Vec::new(),
            model: None,
            tab: Tab::default(),
            error: None,
            generated: None,
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer<B> {
        &self.sync
    }

    pub fn registry(&self) -> &RunRegistry {
        self.sync.registry()
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn model(&self) -> Option<&ModelId> {
        self.model.as_ref()
    }

    /// Load models and known runs. Failures leave empty lists behind.
    pub async fn load(&mut self) {
        match self.sync.backend().list_models().await {
            Ok(models) => {
                if self.model.is_none() {
                    self.model = models.first().cloned();
                }
                self.models = models;
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "model listing failed");
                self.models.clear();
                self.error = Some(MODELS_LOAD_FAILED.to_string());
            }
        }
        self.sync.registry().refresh(self.sync.backend().as_ref()).await;
    }

    /// Blank input clears the selection.
    pub fn select_model(&mut self, model: impl Into<ModelId>) {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
    }

    pub fn set_requirements(&mut self, text: impl Into<String>) {
        self.requirements = text.into();
    }

    pub fn set_openapi(&mut self, text: impl Into<String>) {
        self.openapi = text.into();
    }

    /// Switch tabs. Entering History reloads the run listing.
    pub async fn activate(&mut self, tab: Tab) {
        self.tab = tab;
        if tab == Tab::History {
            self.sync.registry().refresh(self.sync.backend().as_ref()).await;
        }
    }

    /// Submit the current inputs and start following the new run.
    pub async fn run_pipeline(&mut self) -> Result<RunId, SubmitError> {
        self.error = None;
        let mut request = RunRequest::new(self.requirements.clone(), self.openapi.clone());
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        match self.sync.submit(&request).await {
            Ok(id) => {
                self.tab = Tab::Pipeline;
                Ok(id)
            }
            Err(err) => {
                self.error = Some(err.message.clone());
                Err(err)
            }
        }
    }

    /// Show the outcome of a one-shot generation call on the Generate tab.
    ///
    /// A failure keeps the previous output and becomes the error notice.
    pub fn show_generated(&mut self, outcome: Result<Generated, Error>) {
        self.tab = Tab::Generate;
        match outcome {
            Ok(output) => {
                self.error = None;
                self.generated = Some(output);
            }
            Err(err) => {
                let message = err
                    .detail()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map_or_else(|| err.to_string(), str::to_string);
                self.error = Some(message);
            }
        }
    }

    /// Show a history entry. Entries that already carry `run.json` are shown
    /// without a fetch.
    pub async fn open(&mut self, entry: &RunRef) -> SyncState {
        self.tab = Tab::Pipeline;
        match entry.snapshot() {
            Some(Ok(run)) if &run.id == entry.id() => self.sync.observe_snapshot(run),
            _ => self.sync.observe(entry.id().clone()).await,
        }
    }

    pub fn view(&self) -> DashboardView {
        let state = self.sync.state();
        let download_url = state
            .observed
            .as_ref()
            .and_then(|id| self.sync.backend().download_url(id));
        DashboardView {
            tab: self.tab,
            models: self.models.clone(),
            model: self.model.clone(),
            error: self.error.clone(),
            generated: self.generated.clone(),
            history: self.sync.registry().entries(),
            phase: state.phase,
            run: RunView::derive(state.run.as_ref(), download_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        errors::APIError,
        generate::OutputFormat,
        mock::{MockBackend, MockConfig, MockFetch},
        types::{Run, RunFiles, Step, StepName, RUN_FILE},
        view::BadgeTone,
    };

    fn dashboard(cfg: MockConfig) -> (Arc<MockBackend>, Dashboard<MockBackend>) {
        let backend = Arc::new(MockBackend::new(cfg));
        let dash = Dashboard::new(Arc::clone(&backend), PollPolicy::default());
        (backend, dash)
    }

    #[tokio::test]
    async fn load_selects_first_model_and_lists_runs() {
        let (_backend, mut dash) = dashboard(
            MockConfig::default()
                .with_models(["gpt-x", "gpt-y"])
                .with_runs(vec![RunRef::Bare("r0".into())]),
        );
        dash.load().await;

        let view = dash.view();
        assert_eq!(view.models, vec![ModelId::new("gpt-x"), ModelId::new("gpt-y")]);
        assert_eq!(view.model, Some(ModelId::new("gpt-x")));
        assert_eq!(view.history, vec![RunRef::Bare("r0".into())]);
        assert_eq!(view.error, None);
    }

    #[tokio::test]
    async fn load_keeps_existing_selection() {
        let (_backend, mut dash) = dashboard(MockConfig::default().with_models(["a", "b"]));
        dash.select_model("b");
        dash.load().await;
        assert_eq!(dash.model(), Some(&ModelId::new("b")));
    }

    #[tokio::test]
    async fn load_failure_is_a_notice() {
        let (_backend, mut dash) = dashboard(MockConfig::default().with_listing_failure());
        dash.load().await;

        let view = dash.view();
        assert!(view.models.is_empty());
        assert!(view.history.is_empty());
        assert_eq!(view.error.as_deref(), Some(MODELS_LOAD_FAILED));
    }

    #[tokio::test(start_paused = true)]
    async fn run_pipeline_submits_inputs_and_shows_run() {
        let (backend, mut dash) = dashboard(
            MockConfig::default()
                .with_models(["gpt-x"])
                .with_runs(vec![RunRef::Bare("r0".into())])
                .with_submission("r1")
                .with_fetches("r1", vec![MockFetch::Snapshot(Run::queued("r1"))]),
        );
        dash.load().await;
        dash.set_requirements("Users can log in");
        dash.set_openapi("openapi: 3.0.0");

        let id = dash.run_pipeline().await.unwrap();
        assert_eq!(id, RunId::new("r1"));
        assert_eq!(
            backend.submitted(),
            vec![RunRequest::new("Users can log in", "openapi: 3.0.0").with_model("gpt-x")]
        );

        let view = dash.view();
        assert_eq!(dash.registry().ids(), vec![RunId::new("r1"), RunId::new("r0")]);
        assert_eq!(view.run.run_id, Some(RunId::new("r1")));
        assert_eq!(view.run.download_url.as_deref(), Some("mock://runs/r1/download"));
        assert_eq!(view.phase, SyncPhase::Scheduled);
    }

    #[tokio::test]
    async fn run_pipeline_failure_sets_error() {
        let (_backend, mut dash) = dashboard(MockConfig::default().with_submission_error(
            Error::Api(APIError::new(503, "Service Unavailable")),
        ));
        let err = dash.run_pipeline().await.unwrap_err();
        assert_eq!(err.message, "Run failed to start");
        assert_eq!(dash.error(), Some("Run failed to start"));
        assert_eq!(dash.view().run.run_id, None);
        assert!(dash.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn open_detailed_entry_uses_embedded_snapshot() {
        let mut run = Run::queued("r7");
        for name in StepName::ORDER {
            run.set_step(name, Step::with_status("success"));
        }
        let files = RunFiles::from([(RUN_FILE.to_string(), serde_json::to_string(&run).unwrap())]);
        let entry = RunRef::Detailed {
            id: "r7".into(),
            files,
        };
        let (backend, mut dash) = dashboard(MockConfig::default());
        dash.activate(Tab::History).await;

        let state = dash.open(&entry).await;
        assert_eq!(state.phase, SyncPhase::Settled);
        assert_eq!(backend.fetch_count("r7"), 0);
        assert_eq!(dash.tab(), Tab::Pipeline);
        let view = dash.view();
        assert!(view.run.cards.iter().all(|c| c.tone == BadgeTone::Emerald));
    }

    #[tokio::test(start_paused = true)]
    async fn open_bare_entry_fetches() {
        let (backend, mut dash) = dashboard(
            MockConfig::default().with_fetches("r3", vec![MockFetch::Snapshot(Run::queued("r3"))]),
        );
        dash.open(&RunRef::Bare("r3".into())).await;
        assert_eq!(backend.fetch_count("r3"), 1);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert_eq!(backend.fetch_count("r3"), 2);
    }

    #[test]
    fn generate_tab_shows_last_output_or_error() {
        let (_backend, mut dash) = dashboard(MockConfig::default());
        let output = Generated {
            text: "# Login cases".into(),
            format: OutputFormat::Markdown,
            run_id: Some(RunId::new("g1")),
        };

        dash.show_generated(Ok(output.clone()));
        let view = dash.view();
        assert_eq!(view.tab, Tab::Generate);
        assert_eq!(view.generated, Some(output.clone()));
        assert_eq!(view.error, None);

        dash.show_generated(Err(Error::Api(
            APIError::new(502, "Bad Gateway").with_detail("LLM timeout"),
        )));
        let view = dash.view();
        assert_eq!(view.generated, Some(output));
        assert_eq!(view.error.as_deref(), Some("LLM timeout"));
    }

    #[tokio::test]
    async fn history_tab_refreshes_registry() {
        let (_backend, mut dash) = dashboard(
            MockConfig::default().with_runs(vec![RunRef::Bare("a".into()), RunRef::Bare("b".into())]),
        );
        assert!(dash.registry().is_empty());
        dash.activate(Tab::Generate).await;
        assert!(dash.registry().is_empty());
        dash.activate(Tab::History).await;
        assert_eq!(dash.registry().len(), 2);
        assert_eq!(dash.tab(), Tab::History);
    }
}
