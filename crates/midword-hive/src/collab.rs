//! External collaborators: the embedding service and the nearest-neighbor index.

use crate::store::Store;
use async_trait::async_trait;
use midword_core::error::{MidwordError, MwResult};
use midword_core::matches::Neighbor;
use midword_core::types::NamespaceId;
use midword_core::vector;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> MwResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> MwResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MidwordError::Transient("Embedding service returned nothing".into()))
    }
}

/// Nearest neighbors of a vector within one namespace, most similar first.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(
        &self,
        namespace_id: NamespaceId,
        vector: &[f32],
        k: usize,
    ) -> MwResult<Vec<Neighbor>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Calls `POST {base_url}/embed`.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, timeout: Duration) -> MwResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MidwordError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> MwResult<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&EmbedRequest { input: texts })
            .send()
            .await
            .map_err(|e| MidwordError::Transient(format!("POST {}: {}", url, e)))?;

        if !res.status().is_success() {
            return Err(MidwordError::Transient(format!(
                "POST {} returned {}",
                url,
                res.status()
            )));
        }

        let body: EmbedResponse = res
            .json()
            .await
            .map_err(|e| MidwordError::Transient(format!("Bad embedding response: {}", e)))?;

        if body.embeddings.len() != texts.len() {
            return Err(MidwordError::Transient(format!(
                "Asked for {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }
        Ok(body.embeddings)
    }
}

/// Exact cosine scan over the namespace's stored embeddings.
pub struct StoreIndex {
    store: Store,
}

impl StoreIndex {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VectorIndex for StoreIndex {
    async fn search(
        &self,
        namespace_id: NamespaceId,
        query: &[f32],
        k: usize,
    ) -> MwResult<Vec<Neighbor>> {
        let rows = self
            .store
            .list_embeddings(namespace_id)
            .await
            .map_err(|e| MidwordError::Transient(format!("Index scan failed: {}", e)))?;

        let mut hits: Vec<Neighbor> = rows
            .into_iter()
            .filter(|e| e.vector.len() == query.len())
            .map(|e| Neighbor {
                embedding_id: e.id,
                title: e.title,
                score: vector::cosine(&e.vector, query),
                vector: e.vector,
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        debug!("Index scan in {}: {} hits", namespace_id, hits.len());
        Ok(hits)
    }
}
