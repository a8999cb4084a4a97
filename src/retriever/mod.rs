//! Document retrieval with semantic ranking and a keyword fallback
//!
//! With an embedder configured, documents are ranked by ascending Euclidean
//! distance against a flat index covering every ingested document. Without
//! one (or whenever embedding fails) ranking falls back to word overlap.
//! The store and index only ever grow.

pub mod embedding;
pub mod index;
pub mod keyword;
pub mod snapshot;

pub use embedding::{Embedder, HttpEmbedder};
pub use index::FlatL2Index;

use crate::config::Settings;
use crate::error::AssistantError;
use crate::models::{Metadata, SearchMode, SearchResult, SearchResults};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result count used by in-process callers
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: String, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            text,
            metadata,
        }
    }

    fn to_result(&self) -> SearchResult {
        SearchResult {
            text: self.text.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Documents plus the index rows that mirror them.
///
/// Invariant: when `index` is `Some`, row `i` is the embedding of `documents[i]`
/// and `index.len() == documents.len()`.
struct Store {
    documents: Vec<Document>,
    index: Option<FlatL2Index>,
}

pub struct Retriever {
    store: RwLock<Store>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl Retriever {
    pub fn new(documents: Vec<Document>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            store: RwLock::new(Store {
                documents,
                index: None,
            }),
            embedder,
        }
    }

    /// Restore from a snapshot directory written by [`Retriever::save_snapshot`]
    pub async fn load_snapshot(dir: &Path, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let model = embedder.as_ref().map(|e| e.model_name().to_string());
        let snap = snapshot::read(dir, model.as_deref()).await?;
        info!(
            documents = snap.documents.len(),
            indexed = snap.index.is_some(),
            "Loaded retriever snapshot"
        );

        Ok(Self {
            store: RwLock::new(Store {
                documents: snap.documents,
                index: snap.index,
            }),
            embedder,
        })
    }

    /// Build from settings: snapshot dir first, then the seed corpus.
    /// Never fails; problems degrade to an empty keyword-only retriever.
    pub async fn from_settings(settings: &Settings) -> Self {
        let embedder: Option<Arc<dyn Embedder>> = match &settings.embedding {
            Some(cfg) => match HttpEmbedder::new(cfg) {
                Ok(e) => {
                    info!(model = %cfg.model, "Semantic retrieval enabled");
                    Some(Arc::new(e))
                }
                Err(e) => {
                    warn!("Failed to initialise embedder, using keyword search: {}", e);
                    None
                }
            },
            None => {
                info!("No embedding model configured, using keyword search");
                None
            }
        };

        if snapshot::exists(&settings.vector_store_dir) {
            match Self::load_snapshot(&settings.vector_store_dir, embedder.clone()).await {
                Ok(retriever) => return retriever,
                Err(e) => warn!("Failed to load snapshot, falling back to seed documents: {}", e),
            }
        }

        let documents = match load_seed_documents(&settings.docs_path).await {
            Ok(docs) => {
                info!(count = docs.len(), path = %settings.docs_path.display(), "Loaded seed documents");
                docs
            }
            Err(e) => {
                warn!("Failed to load seed documents: {}", e);
                Vec::new()
            }
        };

        Self::new(documents, embedder)
    }

    pub fn mode(&self) -> SearchMode {
        if self.embedder.is_some() {
            SearchMode::Semantic
        } else {
            SearchMode::Keyword
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.store.read().await.documents.clone()
    }

    /// Rank documents for `query`; at most `min(top_k, len)` results
    pub async fn search(&self, query: &str, top_k: usize) -> SearchResults {
        let Some(embedder) = &self.embedder else {
            return self.keyword_search(query, top_k).await;
        };

        match self.semantic_search(embedder.as_ref(), query, top_k).await {
            Ok(results) => results,
            Err(e) => {
                error!("Semantic search failed, falling back to keywords: {}", e);
                self.keyword_search(query, top_k).await
            }
        }
    }

    pub async fn keyword_search(&self, query: &str, top_k: usize) -> SearchResults {
        let store = self.store.read().await;
        let ranked = keyword::rank(
            query,
            store.documents.iter().map(|d| d.text.as_str()),
            top_k,
        );

        debug!(hits = ranked.len(), "Keyword search complete");

        SearchResults {
            results: ranked
                .iter()
                .map(|(i, _)| store.documents[*i].to_result())
                .collect(),
            scores: ranked.iter().map(|(_, s)| *s as f32).collect(),
            mode: SearchMode::Keyword,
        }
    }

    async fn semantic_search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
    ) -> Result<SearchResults> {
        if top_k == 0 || self.is_empty().await {
            return Ok(SearchResults::empty(SearchMode::Semantic));
        }

        let query_vector = embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::EmbeddingError("empty query embedding".into()))?;

        self.ensure_index(embedder).await?;
        if self.drop_index_if_dimension_differs(query_vector.len()).await {
            self.ensure_index(embedder).await?;
        }

        let store = self.store.read().await;
        let index = store
            .index
            .as_ref()
            .ok_or_else(|| AssistantError::RetrievalError("index not built".into()))?;

        let k = top_k.min(store.documents.len());
        let hits = index.search(&query_vector, k)?;

        debug!(hits = hits.len(), "Semantic search complete");

        Ok(SearchResults {
            results: hits
                .iter()
                .map(|(row, _)| store.documents[*row].to_result())
                .collect(),
            scores: hits.iter().map(|(_, d)| d.sqrt()).collect(),
            mode: SearchMode::Semantic,
        })
    }

    /// Drop an index whose rows do not match the query dimension; true when dropped
    async fn drop_index_if_dimension_differs(&self, dimension: usize) -> bool {
        let stale = |index: &Option<FlatL2Index>| {
            index
                .as_ref()
                .map(|i| i.dimension())
                .filter(|d| *d != dimension)
        };
        if stale(&self.store.read().await.index).is_none() {
            return false;
        }

        let mut store = self.store.write().await;
        let Some(current) = stale(&store.index) else {
            return false;
        };
        warn!(
            index = current,
            query = dimension,
            "Index dimension differs from the embedding model, rebuilding"
        );
        store.index = None;
        true
    }

    /// Build the flat index over every stored document if it is missing.
    /// Embedding runs without holding the store lock; documents ingested
    /// meanwhile are embedded as a tail before the index is installed.
    async fn ensure_index(&self, embedder: &dyn Embedder) -> Result<()> {
        let texts: Vec<String> = {
            let store = self.store.read().await;
            if store.index.is_some() {
                return Ok(());
            }
            store.documents.iter().map(|d| d.text.clone()).collect()
        };

        let vectors = embed_exact(embedder, &texts).await?;
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut index = FlatL2Index::new(dimension);
        index.add_batch(&vectors)?;
        let mut covered = texts.len();

        loop {
            let tail: Vec<String> = {
                let mut store = self.store.write().await;
                if store.index.is_some() {
                    // another search installed one first
                    return Ok(());
                }
                if store.documents.len() == covered {
                    info!(
                        model = embedder.model_name(),
                        rows = index.len(),
                        dimension,
                        "Built flat L2 index"
                    );
                    store.index = Some(index);
                    return Ok(());
                }
                store.documents[covered..]
                    .iter()
                    .map(|d| d.text.clone())
                    .collect()
            };

            debug!(documents = tail.len(), "Embedding documents ingested during index build");
            index.add_batch(&embed_exact(embedder, &tail).await?)?;
            covered += tail.len();
        }
    }

    /// Append a document; when the index exists the new vector is appended too.
    pub async fn add_document(&self, text: String, metadata: Option<Metadata>) -> Result<Document> {
        if text.trim().is_empty() {
            return Err(AssistantError::InvalidInput("document text is empty".into()));
        }

        let document = Document::new(text, metadata.unwrap_or_default());

        let index_built = self.store.read().await.index.is_some();
        let vector = match (&self.embedder, index_built) {
            (Some(embedder), true) => match embedder.embed(&[document.text.clone()]).await {
                Ok(mut v) => v.pop(),
                Err(e) => {
                    error!("Error adding document to index: {}", e);
                    None
                }
            },
            _ => None,
        };

        let mut store = self.store.write().await;
        store.documents.push(document.clone());
        let doc_count = store.documents.len();

        if let Some(index) = store.index.as_mut() {
            let appended = match vector {
                // the index may have been rebuilt in between; only append when aligned
                Some(v) if index.len() + 1 == doc_count => index.add(&v).is_ok(),
                _ => index.len() == doc_count,
            };
            if !appended {
                warn!("Index out of step with documents, it will be rebuilt on next search");
                store.index = None;
            }
        }

        debug!(id = %document.id, total = doc_count, "Document added");
        Ok(document)
    }

    pub async fn save_snapshot(&self, dir: &Path) -> Result<()> {
        let store = self.store.read().await;
        let model = self.embedder.as_ref().map(|e| e.model_name());
        snapshot::write(dir, &store.documents, model.zip(store.index.as_ref())).await
    }
}

/// Embed `texts`, requiring exactly one vector per text
async fn embed_exact(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(AssistantError::EmbeddingError(format!(
            "expected {} embeddings, received {}",
            texts.len(),
            vectors.len()
        )));
    }
    Ok(vectors)
}

#[derive(Debug, Deserialize)]
struct SeedDocument {
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

/// Read a JSON array of `{text, metadata}` objects
pub async fn load_seed_documents(path: &Path) -> Result<Vec<Document>> {
    let bytes = tokio::fs::read(path).await?;
    let seeds: Vec<SeedDocument> = serde_json::from_slice(&bytes)?;
    Ok(seeds
        .into_iter()
        .map(|s| Document::new(s.text, s.metadata))
        .collect())
}
