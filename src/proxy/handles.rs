//! Upload storage and the handle registry.
//!
//! A handle (`pdf_id`) is an opaque identifier issued on upload, derived from the
//! original filename and the upload timestamp. The file is fully persisted before the
//! handle becomes visible, so a resolvable handle always points at complete bytes.
//! Handles live for the process lifetime; deletion removes both the mapping and the
//! stored file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{ErrorKind, ToolFault};
use crate::processing::service::sanitize_stem;

/// One uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct HandleRecord {
    /// Opaque handle issued to the client.
    pub pdf_id: String,
    /// Original filename as uploaded.
    pub filename: String,
    /// Path of the stored file.
    #[serde(skip)]
    pub path: PathBuf,
    /// RFC3339 upload timestamp.
    pub uploaded_at: String,
}

/// Process-global map from handle to stored file.
pub struct HandleRegistry {
    uploads_dir: PathBuf,
    entries: Mutex<HashMap<String, HandleRecord>>,
}

impl HandleRegistry {
    /// Create a registry storing files under `uploads_dir`.
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self {
            uploads_dir,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Persist uploaded bytes and issue a fresh handle.
    ///
    /// The write completes before the handle is registered; a handle is never visible
    /// while its file is partial.
    pub async fn store(
        &self,
        original_filename: &str,
        bytes: Vec<u8>,
    ) -> Result<HandleRecord, ToolFault> {
        let pdf_id = self.issue_id(original_filename);
        let path = self.uploads_dir.join(format!("{pdf_id}.pdf"));

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|error| {
                ToolFault::internal(format!("failed to create uploads directory: {error}"))
            })?;
        tokio::fs::write(&path, bytes).await.map_err(|error| {
            ToolFault::internal(format!("failed to persist upload: {error}"))
        })?;

        let record = HandleRecord {
            pdf_id: pdf_id.clone(),
            filename: original_filename.to_string(),
            path,
            uploaded_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        };
        self.entries
            .lock()
            .expect("handle map poisoned")
            .insert(pdf_id, record.clone());
        tracing::info!(pdf_id = %record.pdf_id, filename = %record.filename, "Stored upload");
        Ok(record)
    }

    /// Resolve a handle to its record.
    pub fn resolve(&self, pdf_id: &str) -> Option<HandleRecord> {
        self.entries
            .lock()
            .expect("handle map poisoned")
            .get(pdf_id)
            .cloned()
    }

    /// Resolve a handle or produce the canonical `unknown_handle` fault.
    pub fn resolve_required(&self, pdf_id: &str) -> Result<HandleRecord, ToolFault> {
        self.resolve(pdf_id).ok_or_else(|| {
            ToolFault::new(
                ErrorKind::UnknownHandle,
                format!("no uploaded PDF with id '{pdf_id}'"),
            )
        })
    }

    /// Remove a handle and unlink its stored file.
    pub async fn remove(&self, pdf_id: &str) -> Option<HandleRecord> {
        let record = self
            .entries
            .lock()
            .expect("handle map poisoned")
            .remove(pdf_id)?;
        if let Err(error) = tokio::fs::remove_file(&record.path).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    pdf_id,
                    path = %record.path.display(),
                    error = %error,
                    "Failed to unlink upload"
                );
            }
        }
        Some(record)
    }

    /// All known handles, newest first.
    pub fn list(&self) -> Vec<HandleRecord> {
        let mut records: Vec<HandleRecord> = self
            .entries
            .lock()
            .expect("handle map poisoned")
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(a.pdf_id.cmp(&b.pdf_id)));
        records
    }

    fn issue_id(&self, original_filename: &str) -> String {
        let stem = sanitize_stem(Path::new(original_filename));
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{stem}-{millis}-{}", &suffix[..8])
    }
}
