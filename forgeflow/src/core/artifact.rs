//! Versioned artifacts produced by stages.

use super::StageKind;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Relative path to file content, ordered by path.
pub type FileSet = BTreeMap<String, String>;

/// The kind of document an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Requirements document (markdown).
    RequirementsSpec,
    /// Architecture document with its module list.
    ArchitectureDoc,
    /// Generated source files.
    SourceFiles,
    /// Generated test sources.
    TestFiles,
    /// Per-test pass/fail verdicts.
    TestReport,
    /// Generated documentation files.
    Documentation,
    /// Review notes.
    ReviewNotes,
}

impl ArtifactKind {
    /// All kinds, in the order a completed run produces them.
    pub const ALL: [Self; 7] = [
        Self::RequirementsSpec,
        Self::ArchitectureDoc,
        Self::SourceFiles,
        Self::TestFiles,
        Self::TestReport,
        Self::Documentation,
        Self::ReviewNotes,
    ];

    /// The stage that writes this kind.
    #[must_use]
    pub fn producer(self) -> StageKind {
        match self {
            Self::RequirementsSpec => StageKind::Requirements,
            Self::ArchitectureDoc => StageKind::Architecture,
            Self::SourceFiles => StageKind::Implementation,
            Self::TestFiles | Self::TestReport => StageKind::Testing,
            Self::Documentation => StageKind::Documentation,
            Self::ReviewNotes => StageKind::Review,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequirementsSpec => write!(f, "requirements_spec"),
            Self::ArchitectureDoc => write!(f, "architecture_doc"),
            Self::SourceFiles => write!(f, "source_files"),
            Self::TestFiles => write!(f, "test_files"),
            Self::TestReport => write!(f, "test_report"),
            Self::Documentation => write!(f, "documentation"),
            Self::ReviewNotes => write!(f, "review_notes"),
        }
    }
}

/// Stable key of an artifact: stage, kind and iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// The producing stage.
    pub stage: StageKind,
    /// The artifact kind.
    pub kind: ArtifactKind,
    /// 1-based iteration within (stage, kind).
    pub iteration: u32,
}

impl ArtifactRef {
    /// Creates a new reference.
    #[must_use]
    pub fn new(stage: StageKind, kind: ArtifactKind, iteration: u32) -> Self {
        Self {
            stage,
            kind,
            iteration,
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.stage, self.kind, self.iteration)
    }
}

/// Artifact content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Plain text or markdown.
    Text(String),
    /// Structured content.
    Json(serde_json::Value),
    /// Opaque bytes, base64 encoded when serialized.
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl Payload {
    /// Creates a text payload.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Encodes a file set as `{"files": {path: content}}`.
    #[must_use]
    pub fn from_files(files: &FileSet) -> Self {
        Self::Json(serde_json::json!({ "files": files }))
    }

    /// Returns the text content, if this is a text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the structured content, if this is a JSON payload.
    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Decodes a file set written by [`Payload::from_files`].
    #[must_use]
    pub fn to_files(&self) -> Option<FileSet> {
        let files = self.as_json()?.get("files")?;
        serde_json::from_value(files.clone()).ok()
    }

    /// Renders the payload as text for inclusion in an agent prompt.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => {
                if let Some(files) = self.to_files() {
                    render_files(&files)
                } else {
                    serde_json::to_string_pretty(value).unwrap_or_default()
                }
            }
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }

    /// Hex-encoded SHA-256 over the encoding tag and the canonical bytes.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Self::Text(text) => {
                hasher.update(b"text:");
                hasher.update(text.as_bytes());
            }
            Self::Json(value) => {
                hasher.update(b"json:");
                hasher.update(value.to_string().as_bytes());
            }
            Self::Bytes(bytes) => {
                hasher.update(b"bytes:");
                hasher.update(bytes);
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Size of the content in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Json(value) => value.to_string().len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    /// Returns true if the payload carries no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Renders files in the `FILE: path` convention the agents read and write.
#[must_use]
pub fn render_files(files: &FileSet) -> String {
    files
        .iter()
        .map(|(path, content)| format!("FILE: {path}\n```\n{content}\n```"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Returns true if `path` is relative, non-empty and never leaves its root.
#[must_use]
pub fn is_safe_relative_path(path: &str) -> bool {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return false;
    }
    path.split(['/', '\\']).all(|part| !part.is_empty() && part != "..")
}

/// An immutable, versioned document owned by the artifact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Global insertion order within the store, starting at 0.
    pub sequence: u64,
    /// The producing stage.
    pub stage: StageKind,
    /// The artifact kind.
    pub kind: ArtifactKind,
    /// 1-based iteration within (stage, kind).
    pub iteration: u32,
    /// The content.
    pub payload: Payload,
    /// SHA-256 of the payload.
    pub digest: String,
    /// When the store accepted the artifact.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub(crate) fn new(
        sequence: u64,
        reference: ArtifactRef,
        payload: Payload,
        created_at: DateTime<Utc>,
    ) -> Self {
        let digest = payload.digest();
        Self {
            sequence,
            stage: reference.stage,
            kind: reference.kind,
            iteration: reference.iteration,
            payload,
            digest,
            created_at,
        }
    }

    /// The artifact's key.
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef::new(self.stage, self.kind, self.iteration)
    }

    /// Returns true if the payload still hashes to the recorded digest.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.payload.digest() == self.digest
    }
}

mod base64_bytes {
    use super::{Engine, BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_ref_display() {
        let reference = ArtifactRef::new(StageKind::Testing, ArtifactKind::TestReport, 3);
        assert_eq!(reference.to_string(), "testing/test_report#3");
    }

    #[test]
    fn test_artifact_kind_producer() {
        assert_eq!(ArtifactKind::TestFiles.producer(), StageKind::Testing);
        assert_eq!(ArtifactKind::TestReport.producer(), StageKind::Testing);
        assert_eq!(ArtifactKind::SourceFiles.producer(), StageKind::Implementation);
    }

    #[test]
    fn test_payload_files_roundtrip() {
        let mut files = FileSet::new();
        files.insert("src/main.py".to_string(), "print('hi')".to_string());

        let payload = Payload::from_files(&files);
        assert_eq!(payload.to_files(), Some(files));
        assert!(payload.render().starts_with("FILE: src/main.py"));
    }

    #[test]
    fn test_payload_text_has_no_files() {
        assert!(Payload::text("hello").to_files().is_none());
    }

    #[test]
    fn test_digest_distinguishes_encodings() {
        let text = Payload::text("abc");
        let bytes = Payload::Bytes(b"abc".to_vec());
        assert_ne!(text.digest(), bytes.digest());
        assert_eq!(text.digest(), Payload::text("abc").digest());
        assert_eq!(text.digest().len(), 64);
    }

    #[test]
    fn test_bytes_payload_serializes_base64() {
        let payload = Payload::Bytes(vec![0, 159, 146, 150]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["encoding"], "bytes");
        assert_eq!(json["data"], "AJ+Slg==");

        let back: Payload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_safe_relative_paths() {
        assert!(is_safe_relative_path("src/app.py"));
        assert!(is_safe_relative_path("./README.md"));
        assert!(!is_safe_relative_path("/etc/passwd"));
        assert!(!is_safe_relative_path("../outside.py"));
        assert!(!is_safe_relative_path("src/../../x"));
        assert!(!is_safe_relative_path("C:\\temp\\x.py"));
        assert!(!is_safe_relative_path("src//x.py"));
        assert!(!is_safe_relative_path(""));
    }

    #[test]
    fn test_artifact_verify() {
        let reference = ArtifactRef::new(StageKind::Review, ArtifactKind::ReviewNotes, 1);
        let mut artifact = Artifact::new(0, reference, Payload::text("LGTM"), Utc::now());
        assert!(artifact.verify());
        assert_eq!(artifact.reference(), reference);

        artifact.payload = Payload::text("tampered");
        assert!(!artifact.verify());
    }
}
