//! Retrieval service coordinating extraction, chunking, embedding, and search.
//!
//! The service owns the embedding client, the single-flight registry, and the cache
//! directory so the tool handlers share one pipeline. Request paths suspend only on
//! I/O; PDF parsing and index persistence run on blocking threads, and embedding work
//! is capped by a semaphore so parallel indexing jobs cannot blow up memory on large
//! documents.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::config::get_config;
use crate::embedding::{EmbeddingClient, get_embedding_client};
use crate::error::{ErrorKind, ToolFault};
use crate::extract::{ExtractedDocument, extract_document};

use super::chunking::chunk_text;
use super::registry::DocumentRegistry;
use super::store::DocumentIndex;
use super::types::{ChunkParams, IndexManifest, RetrievedChunk};

/// Instruction prefixed to every retrieval-augmented prompt.
pub const GROUNDING_INSTRUCTION: &str = "Answer the question using only the document excerpts \
provided below. If the excerpts do not contain the answer, say that the document does not \
contain it. Do not invent information.";

/// Upper bound on concurrently running embedding batches across all documents.
const MAX_PARALLEL_EMBEDDING_JOBS: usize = 2;

/// Coordinates the retrieval pipeline behind the tool handlers.
///
/// Construct once near process start and share through an `Arc`.
pub struct RetrievalService {
    embedding: Box<dyn EmbeddingClient + Send + Sync>,
    registry: DocumentRegistry,
    cache_dir: PathBuf,
    chunk_params: ChunkParams,
    default_top_k: usize,
    embed_permits: Semaphore,
    cache_keys: Mutex<HashMap<PathBuf, String>>,
}

impl RetrievalService {
    /// Build a service with an explicit embedder and cache location.
    pub fn new(
        embedding: Box<dyn EmbeddingClient + Send + Sync>,
        cache_dir: PathBuf,
        chunk_params: ChunkParams,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            registry: DocumentRegistry::new(),
            cache_dir,
            chunk_params,
            default_top_k,
            embed_permits: Semaphore::new(MAX_PARALLEL_EMBEDDING_JOBS),
            cache_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Build a service from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            get_embedding_client(),
            config.cache_dir(),
            ChunkParams {
                chunk_size: config.chunk_size,
                overlap: config.chunk_overlap,
            },
            config.top_k,
        )
    }

    /// Chunking parameters in effect for this service.
    pub fn chunk_params(&self) -> ChunkParams {
        self.chunk_params
    }

    /// Manifest describing indexes this service would build right now.
    pub fn manifest(&self) -> IndexManifest {
        IndexManifest {
            embedder_id: self.embedding.embedder_id(),
            chunk_params: self.chunk_params,
            dim: self.embedding.dimension(),
        }
    }

    /// Extract a document's text on a blocking thread.
    pub async fn load_document(&self, path: &Path) -> Result<ExtractedDocument, ToolFault> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_document(&path))
            .await
            .map_err(|error| ToolFault::internal(format!("extraction task failed: {error}")))?
            .map_err(|error| error.to_fault())
    }

    /// Return the document's index, building (or loading from cache) at most once
    /// across concurrent callers.
    pub async fn index_for(&self, path: &Path) -> Result<Arc<DocumentIndex>, ToolFault> {
        self.index_for_with(path, |path| async move {
            tokio::task::spawn_blocking(move || extract_document(&path))
                .await
                .map_err(|error| ToolFault::internal(format!("extraction task failed: {error}")))?
                .map_err(|error| error.to_fault())
        })
        .await
    }

    /// Lower-level variant taking a custom extraction step.
    ///
    /// You likely want [`RetrievalService::index_for`]; this helper exists for tests
    /// that drive the pipeline with synthetic documents.
    pub(crate) async fn index_for_with<F, Fut>(
        &self,
        path: &Path,
        extract: F,
    ) -> Result<Arc<DocumentIndex>, ToolFault>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<ExtractedDocument, ToolFault>>,
    {
        self.registry
            .get_or_build(path, || self.build_index(path.to_path_buf(), extract))
            .await
    }

    async fn build_index<F, Fut>(
        &self,
        path: PathBuf,
        extract: F,
    ) -> Result<Arc<DocumentIndex>, ToolFault>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<ExtractedDocument, ToolFault>>,
    {
        let document = extract(path.clone()).await?;
        if document.is_low_yield() {
            return Err(ToolFault::new(
                ErrorKind::LowYield,
                "the PDF yielded almost no text; it is likely scanned images. \
                 Run OCR before uploading",
            ));
        }

        let key = self.cache_key(&path).await?;
        let expected = self.manifest();
        let dir = self.cache_dir.join(&key);

        let cached = {
            let dir = dir.clone();
            let key = key.clone();
            let expected = expected.clone();
            tokio::task::spawn_blocking(move || DocumentIndex::load(&dir, &key, &expected))
                .await
                .map_err(|error| ToolFault::internal(format!("cache load task failed: {error}")))?
                .map_err(|error| error.to_fault())?
        };
        if let Some(index) = cached {
            tracing::info!(
                path = %path.display(),
                key = %key,
                chunks = index.len(),
                "Loaded document index from cache"
            );
            self.remember_key(&path, &key);
            return Ok(Arc::new(index));
        }

        let chunks = chunk_text(&document.text, self.chunk_params, &key)
            .map_err(|error| error.to_fault())?;
        if chunks.is_empty() {
            return Err(ToolFault::new(
                ErrorKind::LowYield,
                "the PDF text produced no indexable chunks",
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = {
            let _permit = self
                .embed_permits
                .acquire()
                .await
                .map_err(|_| ToolFault::internal("embedding semaphore closed"))?;
            self.embed_with_retry(texts).await?
        };

        let index = DocumentIndex::new(key.clone(), expected, chunks, vectors)
            .map_err(|error| error.to_fault())?;

        {
            let index = index.clone();
            let dir = dir.clone();
            let persisted =
                tokio::task::spawn_blocking(move || index.persist(&dir)).await;
            match persisted {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    // The in-memory index is still good; durability is best-effort.
                    tracing::warn!(key = %key, error = %error, "Failed to persist index");
                }
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Index persist task failed");
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            chunks = index.len(),
            "Built document index"
        );
        self.remember_key(&path, &key);
        Ok(Arc::new(index))
    }

    /// Retrieve the top-k chunks most relevant to `question`, best first.
    ///
    /// An empty document yields an empty list; callers surface the domain error.
    pub async fn retrieve(
        &self,
        path: &Path,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>, ToolFault> {
        let index = self.index_for(path).await?;
        if index.is_empty() {
            return Ok(Vec::new());
        }
        let k = top_k.unwrap_or(self.default_top_k).max(1);
        let mut vectors = self.embed_with_retry(vec![question.to_string()]).await?;
        let query = vectors.pop().ok_or_else(|| {
            ToolFault::new(ErrorKind::EmbedFailed, "embedder returned no query vector")
        })?;
        Ok(index.search(&query, k))
    }

    /// Drop the in-memory entry and unlink cached index files for `path`.
    pub async fn forget(&self, path: &Path) -> Result<bool, ToolFault> {
        let removed_entry = self.registry.remove(path)?;
        let key = {
            let mut keys = self.cache_keys.lock().expect("cache key map poisoned");
            keys.remove(path)
        };
        let key = match key {
            Some(key) => Some(key),
            None if path.exists() => Some(self.cache_key(path).await?),
            None => None,
        };

        let mut removed_files = false;
        if let Some(key) = key {
            let dir = self.cache_dir.join(&key);
            removed_files = tokio::task::spawn_blocking(move || {
                match std::fs::remove_dir_all(&dir) {
                    Ok(()) => true,
                    Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
                    Err(error) => {
                        tracing::warn!(dir = %dir.display(), error = %error, "Failed to remove cache dir");
                        false
                    }
                }
            })
            .await
            .unwrap_or(false);
        }
        Ok(removed_entry || removed_files)
    }

    /// Content-derived cache key: sanitized file stem plus a fingerprint of the bytes.
    async fn cache_key(&self, path: &Path) -> Result<String, ToolFault> {
        let stem = sanitize_stem(path);
        let path = path.to_path_buf();
        let fingerprint = tokio::task::spawn_blocking(move || -> Result<String, std::io::Error> {
            let bytes = std::fs::read(&path)?;
            let digest = Sha256::digest(&bytes);
            Ok(hex::encode(&digest[..6]))
        })
        .await
        .map_err(|error| ToolFault::internal(format!("fingerprint task failed: {error}")))?
        .map_err(|error| {
            ToolFault::new(
                ErrorKind::ExtractFailed,
                format!("failed to read PDF for fingerprinting: {error}"),
            )
        })?;
        Ok(format!("{stem}-{fingerprint}"))
    }

    fn remember_key(&self, path: &Path, key: &str) {
        self.cache_keys
            .lock()
            .expect("cache key map poisoned")
            .insert(path.to_path_buf(), key.to_string());
    }

    async fn embed_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ToolFault> {
        match self.embedding.generate_embeddings(texts.clone()).await {
            Ok(vectors) => Ok(vectors),
            Err(first) => {
                tracing::warn!(error = %first, "Embedding failed; retrying once");
                self.embedding
                    .generate_embeddings(texts)
                    .await
                    .map_err(|error| error.to_fault())
            }
        }
    }
}

/// Assemble the grounded prompt sent to the completion endpoint.
pub fn build_grounded_prompt(question: &str, retrieved: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(GROUNDING_INSTRUCTION);
    prompt.push_str("\n\n");
    for (position, hit) in retrieved.iter().enumerate() {
        prompt.push_str(&format!(
            "--- Excerpt {} (relevance {:.3}) ---\n{}\n\n",
            position + 1,
            hit.score,
            hit.chunk.text
        ));
    }
    prompt.push_str(&format!("Question: {question}\nAnswer:"));
    prompt
}

/// Lowercase a file stem to a filesystem- and URL-safe slug.
pub(crate) fn sanitize_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "document".into()
    } else {
        trimmed.chars().take(40).collect()
    }
}
