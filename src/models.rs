//! Model listing client.
//!
//! Lists the generation models the backend can route a run to.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;

use crate::{client::ClientInner, errors::Result, http::RequestOptions, identifiers::ModelId};

#[derive(Deserialize)]
struct ModelsListResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: ModelId,
}

/// Client for model listing.
#[derive(Clone)]
pub struct ModelsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl ModelsClient {
    /// `GET /models`, in backend order. Entries with a blank id are skipped.
    pub async fn list(&self) -> Result<Vec<ModelId>> {
        let builder = self.inner.request(Method::GET, &["models"])?;
        let resp: ModelsListResponse = self
            .inner
            .execute_json(builder, &RequestOptions::default())
            .await?;
        Ok(resp
            .data
            .into_iter()
            .map(|entry| entry.id)
            .filter(|id| !id.is_empty())
            .collect())
    }
}
