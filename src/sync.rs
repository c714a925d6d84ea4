//! Follows one pipeline run until every step settles.
//!
//! A [`Synchronizer`] observes at most one run at a time. Observing fetches
//! the run right away and then keeps re-fetching on a timer until the run is
//! terminal. Every observation gets a new epoch; results carrying an older
//! epoch are dropped, so a slow response for a run the user already left can
//! never overwrite the current one.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    backend::PipelineBackend,
    errors::{Error, Result},
    identifiers::RunId,
    registry::RunRegistry,
    runs::RunRequest,
    types::Run,
    DEFAULT_POLL_INTERVAL,
};

/// Message shown when a submission fails without a backend `detail`.
pub const RUN_FAILED_TO_START: &str = "Run failed to start";

/// Growth of the poll delay while fetches keep failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub factor: u32,
    pub max: Duration,
}

/// When to fetch again.
///
/// The default polls every [`DEFAULT_POLL_INTERVAL`] and retries failed
/// fetches at that same pace forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub failure_backoff: Option<Backoff>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            failure_backoff: None,
        }
    }
}

impl PollPolicy {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, factor: u32, max: Duration) -> Self {
        self.failure_backoff = Some(Backoff { factor, max });
        self
    }

    /// Delay before the next fetch after `failures` consecutive failed ones.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let Some(backoff) = self.failure_backoff else {
            return self.interval;
        };
        if failures == 0 || backoff.factor <= 1 {
            return self.interval.min(backoff.max);
        }
        let mut delay = self.interval;
        for _ in 0..failures {
            delay = delay.saturating_mul(backoff.factor);
            if delay >= backoff.max {
                return backoff.max;
            }
        }
        delay
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing observed.
    #[default]
    Idle,
    /// A fetch for the observed run is in flight.
    Fetching,
    /// The run is not terminal; a timer will fetch it again.
    Scheduled,
    /// The run is terminal; no timer is armed.
    Settled,
}

/// What the synchronizer currently holds, published to subscribers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub observed: Option<RunId>,
    /// Last snapshot of `observed`. Replaced wholesale, never merged.
    pub run: Option<Run>,
    pub phase: SyncPhase,
    pub consecutive_failures: u32,
    pub epoch: u64,
}

impl SyncState {
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, SyncPhase::Settled | SyncPhase::Idle)
    }
}

/// A submission the backend refused. `message` is meant for the user.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SubmitError {
    pub message: String,
    #[source]
    pub source: Error,
}

impl From<Error> for SubmitError {
    fn from(source: Error) -> Self {
        let message = source
            .detail()
            .map(str::trim)
            .filter(|detail| !detail.is_empty())
            .unwrap_or(RUN_FAILED_TO_START)
            .to_string();
        Self { message, source }
    }
}

/// Owns the observed run and its poll timer.
pub struct Synchronizer<B: PipelineBackend> {
    driver: Arc<Driver<B>>,
    registry: RunRegistry,
}

impl<B: PipelineBackend> Synchronizer<B> {
    pub fn new(backend: Arc<B>, policy: PollPolicy) -> Self {
        Self::with_registry(backend, policy, RunRegistry::new())
    }

    /// Submissions will be prepended to `registry`.
    pub fn with_registry(backend: Arc<B>, policy: PollPolicy, registry: RunRegistry) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            driver: Arc::new(Driver {
                backend,
                policy,
                slot: Mutex::new(PollSlot::default()),
                state,
            }),
            registry,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.driver.backend
    }

    pub fn policy(&self) -> PollPolicy {
        self.driver.policy
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.driver.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.driver.state.borrow().clone()
    }

    /// Start following `id`, replacing whatever was observed before.
    ///
    /// The previous timer is cancelled and its in-flight result invalidated.
    /// One fetch is made before returning; if the run is not terminal a timer
    /// keeps fetching it. Re-observing the current id keeps its snapshot
    /// until a fresher one arrives.
    pub async fn observe(&self, id: impl Into<RunId>) -> SyncState {
        let id = id.into();
        if id.is_empty() {
            self.cancel();
            return self.state();
        }
        let epoch = self.driver.begin(&id);
        #[cfg(feature = "tracing")]
        tracing::debug!(run_id = %id, epoch, "observing run");

        let outcome = self.driver.backend.fetch_run(&id).await;
        self.driver.apply(epoch, &id, outcome, true);
        self.state()
    }

    /// Follow a run whose snapshot is already at hand, without fetching it.
    ///
    /// Must be called from within a tokio runtime when `run` is not terminal.
    pub fn observe_snapshot(&self, run: Run) -> SyncState {
        let id = run.id.clone();
        let epoch = self.driver.begin(&id);
        self.driver.apply(epoch, &id, Ok(Some(run)), true);
        self.state()
    }

    /// Submit a new run, observe it, and put it at the front of the registry.
    pub async fn submit(&self, request: &RunRequest) -> Result<RunId, SubmitError> {
        let id = match self.driver.backend.submit_run(request).await {
            Ok(id) => id,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "run submission failed");
                return Err(SubmitError::from(err));
            }
        };
        self.observe(id.clone()).await;
        self.registry.prepend(id.clone());
        Ok(id)
    }

    /// Stop polling and forget the observed run.
    pub fn cancel(&self) {
        self.driver.stop();
    }

    /// Wait until the observed run is terminal, or nothing is observed.
    pub async fn wait_settled(&self) -> SyncState {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(SyncState::is_settled).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| self.state())
    }
}

impl<B: PipelineBackend> Drop for Synchronizer<B> {
    fn drop(&mut self) {
        self.driver.halt();
    }
}

struct Driver<B> {
    backend: Arc<B>,
    policy: PollPolicy,
    slot: Mutex<PollSlot>,
    state: watch::Sender<SyncState>,
}

/// Current epoch and the timer armed for it. Both change under one lock.
#[derive(Default)]
struct PollSlot {
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl PollSlot {
    fn advance(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.epoch
    }
}

enum Next {
    Settled,
    Poll(Duration),
}

impl<B: PipelineBackend> Driver<B> {
    fn slot(&self) -> MutexGuard<'_, PollSlot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, id: &RunId) -> u64 {
        let mut slot = self.slot();
        let epoch = slot.advance();
        self.state.send_modify(|state| {
            if state.observed.as_ref() != Some(id) {
                state.run = None;
            }
            state.observed = Some(id.clone());
            state.phase = SyncPhase::Fetching;
            state.consecutive_failures = 0;
            state.epoch = epoch;
        });
        epoch
    }

    fn halt(&self) {
        self.slot().advance();
    }

    fn stop(&self) {
        let mut slot = self.slot();
        let epoch = slot.advance();
        self.state.send_replace(SyncState {
            epoch,
            ..SyncState::default()
        });
    }

    /// False when the observation moved on while the timer slept.
    fn start_tick(&self, epoch: u64) -> bool {
        let slot = self.slot();
        if slot.epoch != epoch {
            return false;
        }
        self.state.send_modify(|state| state.phase = SyncPhase::Fetching);
        true
    }

    /// Record a fetch outcome if `epoch` is still current.
    ///
    /// With `arm`, a non-terminal run gets a fresh poll task; the epoch check
    /// and the swap happen under the same lock.
    fn apply(
        self: &Arc<Self>,
        epoch: u64,
        id: &RunId,
        outcome: Result<Option<Run>>,
        arm: bool,
    ) -> Option<Next> {
        let mut slot = self.slot();
        if slot.epoch != epoch {
            #[cfg(feature = "tracing")]
            tracing::debug!(run_id = %id, epoch, current = slot.epoch, "discarding stale fetch result");
            return None;
        }

        let mut terminal = false;
        let mut failures = 0;
        self.state.send_modify(|state| {
            match outcome {
                Ok(Some(run)) => {
                    state.run = Some(run);
                    state.consecutive_failures = 0;
                }
                Ok(None) => state.consecutive_failures = 0,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(run_id = %id, error = %_err, "run fetch failed; retrying on next tick");
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                }
            }
            terminal = state.run.as_ref().is_some_and(Run::is_terminal);
            state.phase = if terminal {
                SyncPhase::Settled
            } else {
                SyncPhase::Scheduled
            };
            failures = state.consecutive_failures;
        });

        if terminal {
            slot.timer = None;
            #[cfg(feature = "tracing")]
            tracing::debug!(run_id = %id, "run settled");
            return Some(Next::Settled);
        }

        let delay = self.policy.delay_after(failures);
        if arm {
            if let Some(previous) = slot.timer.take() {
                previous.abort();
            }
            let task = poll_loop(Arc::clone(self), epoch, id.clone(), delay);
            slot.timer = Some(tokio::spawn(task));
        }
        Some(Next::Poll(delay))
    }
}

async fn poll_loop<B: PipelineBackend>(
    driver: Arc<Driver<B>>,
    epoch: u64,
    id: RunId,
    mut delay: Duration,
) {
    loop {
        tokio::time::sleep(delay).await;
        if !driver.start_tick(epoch) {
            return;
        }
        let outcome = driver.backend.fetch_run(&id).await;
        match driver.apply(epoch, &id, outcome, false) {
            Some(Next::Poll(next)) => delay = next,
            Some(Next::Settled) | None => return,
        }
    }
}
