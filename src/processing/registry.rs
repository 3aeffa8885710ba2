//! Process-global document registry with single-flight index builds.
//!
//! Concurrent requests for the same document path must not each build the index:
//! exactly one caller runs the build while the others wait on a per-entry completion
//! signal and observe its result. The map lock is never held across an await point;
//! builds run outside the lock.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::error::{ErrorKind, ToolFault};

use super::store::DocumentIndex;

type BuildResult = Result<Arc<DocumentIndex>, ToolFault>;

enum EntryState {
    /// A build is in flight; waiters subscribe to the channel.
    Building(watch::Receiver<Option<BuildResult>>),
    /// The index is available.
    Ready(Arc<DocumentIndex>),
}

/// Registry of in-memory document indexes keyed by document path.
#[derive(Default)]
pub struct DocumentRegistry {
    entries: Mutex<HashMap<PathBuf, EntryState>>,
}

impl DocumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index for `path`, building it at most once across concurrent callers.
    ///
    /// A failed build is reported to every waiter and then cleared, so a later request
    /// may retry instead of the failure poisoning the document for the process lifetime.
    pub async fn get_or_build<F, Fut>(&self, path: &Path, build: F) -> BuildResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BuildResult>,
    {
        enum Decision {
            Ready(Arc<DocumentIndex>),
            Wait(watch::Receiver<Option<BuildResult>>),
            Build(watch::Sender<Option<BuildResult>>),
        }

        let decision = {
            let mut entries = self.entries.lock().expect("registry lock poisoned");
            match entries.get(path) {
                Some(EntryState::Ready(index)) => Decision::Ready(Arc::clone(index)),
                Some(EntryState::Building(rx)) => Decision::Wait(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    entries.insert(path.to_path_buf(), EntryState::Building(rx));
                    Decision::Build(tx)
                }
            }
        };

        let tx = match decision {
            Decision::Ready(index) => return Ok(index),
            Decision::Wait(mut rx) => return wait_for_result(&mut rx).await,
            Decision::Build(tx) => tx,
        };

        let result = build().await;

        {
            let mut entries = self.entries.lock().expect("registry lock poisoned");
            match &result {
                Ok(index) => {
                    entries.insert(path.to_path_buf(), EntryState::Ready(Arc::clone(index)));
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        kind = %error.kind,
                        "Index build failed"
                    );
                    entries.remove(path);
                }
            }
        }
        let _ = tx.send(Some(result.clone()));
        result
    }

    /// Drop the entry for `path`. Fails while a build is in flight.
    pub fn remove(&self, path: &Path) -> Result<bool, ToolFault> {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        match entries.get(path) {
            Some(EntryState::Building(_)) => Err(ToolFault::new(
                ErrorKind::IndexUnavailable,
                "document index is being built; retry the delete shortly",
            )),
            Some(EntryState::Ready(_)) => {
                entries.remove(path);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of paths currently held, ready or building.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

async fn wait_for_result(rx: &mut watch::Receiver<Option<BuildResult>>) -> BuildResult {
    let outcome = rx.wait_for(|value| value.is_some()).await;
    match outcome {
        Ok(value) => value
            .clone()
            .expect("watch predicate guarantees a populated result"),
        // The builder was dropped without signaling.
        Err(_) => Err(ToolFault::new(
            ErrorKind::IndexUnavailable,
            "index build was abandoned",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::{ChunkParams, IndexManifest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn empty_index() -> Arc<DocumentIndex> {
        let manifest = IndexManifest {
            embedder_id: "hash-test".into(),
            chunk_params: ChunkParams {
                chunk_size: 100,
                overlap: 20,
            },
            dim: 2,
        };
        Arc::new(DocumentIndex::new("doc".into(), manifest, vec![], vec![]).expect("index"))
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_exactly_one_build() {
        let registry = Arc::new(DocumentRegistry::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let path = PathBuf::from("/tmp/doc.pdf");

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let registry = Arc::clone(&registry);
            let builds = Arc::clone(&builds);
            let path = path.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .get_or_build(&path, || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                        Ok(empty_index())
                    })
                    .await
            }));
        }

        for task in tasks {
            task.await.expect("join").expect("build result");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ready_entries_are_returned_without_rebuilding() {
        let registry = DocumentRegistry::new();
        let path = PathBuf::from("/tmp/doc.pdf");
        let first = registry
            .get_or_build(&path, || async { Ok(empty_index()) })
            .await
            .expect("first build");
        let second = registry
            .get_or_build(&path, || async {
                panic!("must not rebuild a ready entry")
            })
            .await
            .expect("cached entry");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_builds_propagate_and_allow_retry() {
        let registry = DocumentRegistry::new();
        let path = PathBuf::from("/tmp/doc.pdf");

        let error = registry
            .get_or_build(&path, || async {
                Err(ToolFault::new(ErrorKind::EmbedFailed, "flaky"))
            })
            .await
            .expect_err("first build fails");
        assert_eq!(error.kind, ErrorKind::EmbedFailed);

        // The failed entry was cleared; a retry builds again and succeeds.
        let index = registry
            .get_or_build(&path, || async { Ok(empty_index()) })
            .await
            .expect("retry succeeds");
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn remove_refuses_while_building() {
        let registry = Arc::new(DocumentRegistry::new());
        let path = PathBuf::from("/tmp/doc.pdf");

        let builder = {
            let registry = Arc::clone(&registry);
            let path = path.clone();
            tokio::spawn(async move {
                registry
                    .get_or_build(&path, || async {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(empty_index())
                    })
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let error = registry.remove(&path).expect_err("delete during build");
        assert_eq!(error.kind, ErrorKind::IndexUnavailable);

        builder.await.expect("join").expect("build");
        assert!(registry.remove(&path).expect("delete after build"));
        assert!(!registry.remove(&path).expect("second delete is a no-op"));
    }
}
