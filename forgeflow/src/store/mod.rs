//! Versioned, append-only artifact storage.
//!
//! The store owns every artifact produced during a run. Iterations are
//! assigned under the write lock, so references never collide and strictly
//! increase per (stage, kind). Nothing is ever overwritten or deleted.

mod log;

use crate::core::{Artifact, ArtifactKind, ArtifactRef, Payload, StageKind};
use crate::errors::StoreError;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    log: Vec<Arc<Artifact>>,
    index: HashMap<ArtifactRef, usize>,
    counters: HashMap<(StageKind, ArtifactKind), u32>,
}

impl Inner {
    fn next_iteration(&self, stage: StageKind, kind: ArtifactKind) -> u32 {
        self.counters.get(&(stage, kind)).copied().unwrap_or(0) + 1
    }

    fn append(&mut self, artifact: Artifact) -> ArtifactRef {
        let reference = artifact.reference();
        self.counters
            .insert((artifact.stage, artifact.kind), artifact.iteration);
        self.index.insert(reference, self.log.len());
        self.log.push(Arc::new(artifact));
        reference
    }
}

/// In-memory artifact store for one run session.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    inner: RwLock<Inner>,
}

impl ArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new artifact and returns its reference.
    pub fn put(&self, stage: StageKind, kind: ArtifactKind, payload: Payload) -> ArtifactRef {
        let mut inner = self.inner.write();
        let iteration = inner.next_iteration(stage, kind);
        let sequence = inner.log.len() as u64;
        let reference = ArtifactRef::new(stage, kind, iteration);
        let artifact = Artifact::new(sequence, reference, payload, Utc::now());

        debug!(
            artifact = %reference,
            sequence,
            bytes = artifact.payload.len(),
            "Artifact stored"
        );
        inner.append(artifact)
    }

    /// Returns the artifact for a reference.
    pub fn get(&self, reference: &ArtifactRef) -> Result<Arc<Artifact>, StoreError> {
        let inner = self.inner.read();
        inner
            .index
            .get(reference)
            .map(|&i| Arc::clone(&inner.log[i]))
            .ok_or(StoreError::NotFound {
                reference: *reference,
            })
    }

    /// Returns the highest iteration of (stage, kind).
    #[must_use]
    pub fn latest(&self, stage: StageKind, kind: ArtifactKind) -> Option<Arc<Artifact>> {
        let inner = self.inner.read();
        let iteration = *inner.counters.get(&(stage, kind))?;
        let i = *inner
            .index
            .get(&ArtifactRef::new(stage, kind, iteration))?;
        Some(Arc::clone(&inner.log[i]))
    }

    /// Returns the most recent artifact of a kind, whichever stage wrote it.
    #[must_use]
    pub fn latest_of_kind(&self, kind: ArtifactKind) -> Option<Arc<Artifact>> {
        self.inner
            .read()
            .log
            .iter()
            .rev()
            .find(|a| a.kind == kind)
            .cloned()
    }

    /// Returns the latest artifact of every kind present, in kind order.
    #[must_use]
    pub fn latest_per_kind(&self) -> Vec<Arc<Artifact>> {
        ArtifactKind::ALL
            .iter()
            .filter_map(|&kind| self.latest_of_kind(kind))
            .collect()
    }

    /// Returns every artifact written by a stage, in insertion order.
    #[must_use]
    pub fn history(&self, stage: StageKind) -> Vec<Arc<Artifact>> {
        self.inner
            .read()
            .log
            .iter()
            .filter(|a| a.stage == stage)
            .cloned()
            .collect()
    }

    /// Returns every artifact in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<Artifact>> {
        self.inner.read().log.clone()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().log.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().log.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_put_assigns_increasing_iterations() {
        let store = ArtifactStore::new();

        let first = store.put(
            StageKind::Implementation,
            ArtifactKind::SourceFiles,
            Payload::text("v1"),
        );
        let other = store.put(
            StageKind::Requirements,
            ArtifactKind::RequirementsSpec,
            Payload::text("reqs"),
        );
        let second = store.put(
            StageKind::Implementation,
            ArtifactKind::SourceFiles,
            Payload::text("v2"),
        );

        assert_eq!(first.iteration, 1);
        assert_eq!(other.iteration, 1);
        assert_eq!(second.iteration, 2);
        assert_ne!(first, second);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_get_is_stable() {
        let store = ArtifactStore::new();
        let reference = store.put(
            StageKind::Review,
            ArtifactKind::ReviewNotes,
            Payload::text("LGTM"),
        );
        store.put(
            StageKind::Review,
            ArtifactKind::ReviewNotes,
            Payload::text("changed my mind"),
        );

        let a = store.get(&reference).unwrap();
        let b = store.get(&reference).unwrap();
        assert_eq!(a.payload, Payload::text("LGTM"));
        assert_eq!(a, b);
        assert!(a.verify());
    }

    #[test]
    fn test_get_unknown_reference() {
        let store = ArtifactStore::new();
        let reference = ArtifactRef::new(StageKind::Testing, ArtifactKind::TestReport, 1);

        let err = store.get(&reference).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { reference: r } if r == reference));
    }

    #[test]
    fn test_latest_and_history() {
        let store = ArtifactStore::new();
        assert!(store.is_empty());
        assert!(store
            .latest(StageKind::Testing, ArtifactKind::TestReport)
            .is_none());

        store.put(StageKind::Testing, ArtifactKind::TestFiles, Payload::text("t1"));
        store.put(StageKind::Testing, ArtifactKind::TestReport, Payload::text("r1"));
        store.put(StageKind::Testing, ArtifactKind::TestReport, Payload::text("r2"));

        let latest = store
            .latest(StageKind::Testing, ArtifactKind::TestReport)
            .unwrap();
        assert_eq!(latest.iteration, 2);
        assert_eq!(latest.payload, Payload::text("r2"));

        let history: Vec<_> = store
            .history(StageKind::Testing)
            .iter()
            .map(|a| a.payload.render())
            .collect();
        assert_eq!(history, vec!["t1", "r1", "r2"]);
        assert!(store.history(StageKind::Review).is_empty());
    }

    #[test]
    fn test_latest_per_kind_in_kind_order() {
        let store = ArtifactStore::new();
        store.put(
            StageKind::Implementation,
            ArtifactKind::SourceFiles,
            Payload::text("src"),
        );
        store.put(
            StageKind::Requirements,
            ArtifactKind::RequirementsSpec,
            Payload::text("reqs"),
        );

        let kinds: Vec<_> = store.latest_per_kind().iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ArtifactKind::RequirementsSpec, ArtifactKind::SourceFiles]
        );
    }

    #[tokio::test]
    async fn test_concurrent_puts_never_collide() {
        let store = Arc::new(ArtifactStore::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.put(
                        StageKind::Implementation,
                        ArtifactKind::SourceFiles,
                        Payload::text(format!("v{i}")),
                    )
                })
            })
            .collect();

        let mut iterations = Vec::new();
        for handle in handles {
            iterations.push(handle.await.unwrap().iteration);
        }
        iterations.sort_unstable();

        assert_eq!(iterations, (1..=32).collect::<Vec<_>>());
    }
}
