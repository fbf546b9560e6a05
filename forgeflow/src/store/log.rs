//! Append-only JSON-lines persistence for the artifact store.
//!
//! One artifact per line, in sequence order. Replaying a log rebuilds an
//! identical store and rejects tampered or reordered entries.

use super::{ArtifactStore, Inner};
use crate::core::Artifact;
use crate::errors::StoreError;
use parking_lot::RwLock;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

impl ArtifactStore {
    /// Writes every artifact as one JSON line. Returns the number written.
    pub fn export_log<W: Write>(&self, mut writer: W) -> Result<usize, StoreError> {
        let entries = self.entries();
        for artifact in &entries {
            let line = serde_json::to_string(artifact.as_ref()).map_err(|e| {
                StoreError::CorruptLog {
                    line: usize::try_from(artifact.sequence).unwrap_or(usize::MAX) + 1,
                    reason: e.to_string(),
                }
            })?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(entries.len())
    }

    /// Exports the log to a file, replacing it.
    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let path = path.as_ref();
        let written = self.export_log(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), artifacts = written, "Artifact log exported");
        Ok(written)
    }

    /// Rebuilds a store from a JSON-lines log.
    ///
    /// Fails on undecodable lines, gaps in a (stage, kind) iteration sequence,
    /// out-of-order sequence numbers and payloads that do not match their digest.
    pub fn replay<R: BufRead>(reader: R) -> Result<Self, StoreError> {
        let mut inner = Inner::default();

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let artifact: Artifact =
                serde_json::from_str(&line).map_err(|e| StoreError::CorruptLog {
                    line: line_no,
                    reason: e.to_string(),
                })?;

            if artifact.sequence != inner.log.len() as u64 {
                return Err(StoreError::CorruptLog {
                    line: line_no,
                    reason: format!(
                        "expected sequence {}, found {}",
                        inner.log.len(),
                        artifact.sequence
                    ),
                });
            }

            let reference = artifact.reference();
            let expected = inner.next_iteration(artifact.stage, artifact.kind);
            if artifact.iteration != expected {
                return Err(StoreError::NonMonotonicIteration {
                    reference,
                    expected,
                });
            }
            if !artifact.verify() {
                return Err(StoreError::DigestMismatch { reference });
            }

            inner.append(artifact);
        }

        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Replays a log file.
    pub fn replay_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::replay(BufReader::new(File::open(path)?))
    }
}
