//! Locally known runs, most recent first.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{backend::PipelineBackend, identifiers::RunId, types::RunRef};

/// Ordered, deduplicated list of run references.
///
/// Clones share the same list. Readers can [`subscribe`](Self::subscribe) to be
/// notified when it changes.
#[derive(Clone)]
pub struct RunRegistry {
    entries: Arc<watch::Sender<Vec<RunRef>>>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::from_entries(Vec::new())
    }

    pub fn from_entries(entries: Vec<RunRef>) -> Self {
        let (tx, _) = watch::channel(dedup(entries));
        Self {
            entries: Arc::new(tx),
        }
    }

    pub fn entries(&self) -> Vec<RunRef> {
        self.entries.borrow().clone()
    }

    pub fn ids(&self) -> Vec<RunId> {
        self.entries.borrow().iter().map(|e| e.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn contains(&self, id: &RunId) -> bool {
        self.entries.borrow().iter().any(|e| e.id() == id)
    }

    pub fn get(&self, id: &RunId) -> Option<RunRef> {
        self.entries.borrow().iter().find(|e| e.id() == id).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<RunRef>> {
        self.entries.subscribe()
    }

    /// Put `id` at position 0. An existing entry for the same id is removed
    /// first, so the id appears exactly once; the rest keep their order.
    pub fn prepend(&self, id: RunId) {
        self.entries.send_modify(|entries| {
            entries.retain(|e| e.id() != &id);
            entries.insert(0, RunRef::Bare(id));
        });
    }

    /// Replace the whole list. Later duplicates of an id are dropped.
    pub fn replace(&self, entries: Vec<RunRef>) {
        self.entries.send_replace(dedup(entries));
    }

    /// Reload from the backend listing. A failed listing empties the registry.
    pub async fn refresh<B: PipelineBackend + ?Sized>(&self, backend: &B) -> usize {
        let entries = match backend.list_runs().await {
            Ok(entries) => entries,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_err, "run listing failed");
                Vec::new()
            }
        };
        self.replace(entries);
        self.len()
    }
}

fn dedup(entries: Vec<RunRef>) -> Vec<RunRef> {
    let mut out: Vec<RunRef> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.id().is_empty() || out.iter().any(|e| e.id() == entry.id()) {
            continue;
        }
        out.push(entry);
    }
    out
}
