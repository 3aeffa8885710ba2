//! In-memory document index with file-backed persistence.
//!
//! An index is the aggregate of a document's chunks, their embedding vectors, and the
//! manifest describing how both were produced. On disk an index is a directory of
//! three files:
//!
//! ```text
//! <cache>/<key>/manifest.json    { embedder_id, chunk_params, dim }
//! <cache>/<key>/chunks.ndjson    one chunk per line
//! <cache>/<key>/vectors.bin      magic, dim, count header; little-endian f32 rows
//! ```
//!
//! Writes go to a temp sibling directory first and are renamed into place, so a crash
//! never leaves a half-written directory that passes validation; a directory without a
//! readable, matching manifest is treated as absent.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::types::{Chunk, IndexError, IndexManifest, RetrievedChunk};

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.ndjson";
const VECTORS_FILE: &str = "vectors.bin";
const VECTORS_MAGIC: &[u8; 4] = b"AVEC";

/// Searchable collection of vectors plus their backing chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentIndex {
    /// Cache key of the indexed document.
    pub document_id: String,
    /// Provenance of the chunks and vectors.
    pub manifest: IndexManifest,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl DocumentIndex {
    /// Assemble an index, validating that chunks and vectors are parallel and that
    /// every vector matches the manifest dimension.
    pub fn new(
        document_id: String,
        manifest: IndexManifest,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::ShapeMismatch(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != manifest.dim) {
            return Err(IndexError::ShapeMismatch(format!(
                "vector {bad} has dimension {} but manifest says {}",
                vectors[bad].len(),
                manifest.dim
            )));
        }
        Ok(Self {
            document_id,
            manifest,
            chunks,
            vectors,
        })
    }

    /// Number of chunks in the index.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Return the `k` chunks most similar to `query` by inner product, best first.
    ///
    /// Ties break toward the lower ordinal. Asking for more chunks than exist returns
    /// them all; an empty index returns an empty list.
    ///
    /// Selection keeps a `k`-bounded min-heap while scanning, so a query costs
    /// O(n log k) rather than a full sort. The scan itself is exhaustive over the
    /// document's vectors; see DESIGN.md for the approximate-nearest-neighbor upgrade
    /// path once single-document indexes stop fitting that model.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        if k == 0 {
            return Vec::new();
        }
        let mut best: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        for (ordinal, vector) in self.vectors.iter().enumerate() {
            let score = vector
                .iter()
                .zip(query.iter())
                .map(|(a, b)| a * b)
                .sum::<f32>();
            best.push(Reverse(Candidate { score, ordinal }));
            if best.len() > k {
                best.pop();
            }
        }
        best.into_sorted_vec()
            .into_iter()
            .map(|Reverse(candidate)| RetrievedChunk {
                chunk: self.chunks[candidate.ordinal].clone(),
                score: candidate.score,
            })
            .collect()
    }

    /// Persist the index atomically under `dir`.
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        let parent = dir.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let stem = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".into());
        let staging = parent.join(format!("{stem}.tmp-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging)?;

        let result = self.write_files(&staging);
        if let Err(error) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(error);
        }

        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::rename(&staging, dir)?;
        Ok(())
    }

    fn write_files(&self, dir: &Path) -> Result<(), IndexError> {
        let manifest_json = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|error| IndexError::Corrupt(error.to_string()))?;
        fs::write(dir.join(MANIFEST_FILE), manifest_json)?;

        let mut chunks_out = BufWriter::new(fs::File::create(dir.join(CHUNKS_FILE))?);
        for chunk in &self.chunks {
            let line =
                serde_json::to_vec(chunk).map_err(|error| IndexError::Corrupt(error.to_string()))?;
            chunks_out.write_all(&line)?;
            chunks_out.write_all(b"\n")?;
        }
        chunks_out.flush()?;

        let mut vectors_out = BufWriter::new(fs::File::create(dir.join(VECTORS_FILE))?);
        vectors_out.write_all(VECTORS_MAGIC)?;
        vectors_out.write_all(&(self.manifest.dim as u32).to_le_bytes())?;
        vectors_out.write_all(&(self.vectors.len() as u32).to_le_bytes())?;
        for vector in &self.vectors {
            for value in vector {
                vectors_out.write_all(&value.to_le_bytes())?;
            }
        }
        vectors_out.flush()?;
        Ok(())
    }

    /// Load a cached index from `dir` when it exists and matches `expected`.
    ///
    /// Returns `Ok(None)` when the directory or manifest is absent, the manifest does
    /// not match the live embedder/chunking configuration, or the files fail
    /// validation; in every case the caller should rebuild.
    pub fn load(
        dir: &Path,
        document_id: &str,
        expected: &IndexManifest,
    ) -> Result<Option<Self>, IndexError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Ok(None);
        }
        let manifest: IndexManifest =
            match fs::read(&manifest_path).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok())
            {
                Some(manifest) => manifest,
                None => {
                    tracing::warn!(dir = %dir.display(), "Unreadable index manifest; rebuilding");
                    return Ok(None);
                }
            };
        if &manifest != expected {
            tracing::info!(
                dir = %dir.display(),
                "Index manifest does not match current configuration; rebuilding"
            );
            return Ok(None);
        }

        match Self::read_files(dir, document_id, manifest) {
            Ok(index) => Ok(Some(index)),
            Err(error) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %error,
                    "Cached index failed validation; rebuilding"
                );
                Ok(None)
            }
        }
    }

    fn read_files(
        dir: &Path,
        document_id: &str,
        manifest: IndexManifest,
    ) -> Result<Self, IndexError> {
        let mut chunks = Vec::new();
        let chunks_in = BufReader::new(fs::File::open(dir.join(CHUNKS_FILE))?);
        for line in chunks_in.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk: Chunk = serde_json::from_str(&line)
                .map_err(|error| IndexError::Corrupt(format!("chunk line: {error}")))?;
            chunks.push(chunk);
        }

        let mut vectors_in = BufReader::new(fs::File::open(dir.join(VECTORS_FILE))?);
        let mut header = [0u8; 12];
        vectors_in.read_exact(&mut header)?;
        if &header[0..4] != VECTORS_MAGIC {
            return Err(IndexError::Corrupt("bad vectors.bin magic".into()));
        }
        let dim = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let count = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
        if dim != manifest.dim {
            return Err(IndexError::Corrupt(format!(
                "vectors.bin dimension {dim} disagrees with manifest {}",
                manifest.dim
            )));
        }

        let mut vectors = Vec::with_capacity(count);
        let mut row = vec![0u8; dim * 4];
        for _ in 0..count {
            vectors_in.read_exact(&mut row)?;
            let vector: Vec<f32> = row
                .chunks_exact(4)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect();
            vectors.push(vector);
        }

        Self::new(document_id.to_string(), manifest, chunks, vectors)
    }
}

/// Heap entry for top-k selection: greater means better (higher score; on equal
/// scores, the lower ordinal).
struct Candidate {
    score: f32,
    ordinal: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}
