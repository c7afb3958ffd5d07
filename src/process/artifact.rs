//! Named, encoded outputs of the pipeline.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Role an artifact plays within one upload.
///
/// The declaration order is the order in which artifacts are produced and
/// committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// The uploaded bytes, untouched
    Original,

    /// Fine-texture edge layer painted blue
    BlueEdges,

    /// Dominant-contour edge layer painted yellow
    YellowEdges,
}

impl ArtifactRole {
    /// Every role, in commit order.
    pub const ALL: [ArtifactRole; 3] = [
        ArtifactRole::Original,
        ArtifactRole::BlueEdges,
        ArtifactRole::YellowEdges,
    ];

    /// Stable lowercase name, used in filenames and JSON keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactRole::Original => "original",
            ArtifactRole::BlueEdges => "blue_edges",
            ArtifactRole::YellowEdges => "yellow_edges",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, encoded image ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub role: ArtifactRole,

    /// Suggested filename for the stored blob
    pub filename: String,

    /// MIME type of `data`
    pub content_type: String,

    pub data: Bytes,
}

/// The full, ordered output of one pipeline run.
///
/// An `ArtifactSet` only exists when every variant encoded successfully, so
/// handing one to the committer never commits a partial upload.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: Vec<EncodedArtifact>,
}

impl ArtifactSet {
    pub(crate) fn new(artifacts: Vec<EncodedArtifact>) -> Self {
        Self { artifacts }
    }

    /// Look up the artifact for a role.
    pub fn get(&self, role: ArtifactRole) -> Option<&EncodedArtifact> {
        self.artifacts.iter().find(|a| a.role == role)
    }

    /// Iterate artifacts in commit order.
    pub fn iter(&self) -> impl Iterator<Item = &EncodedArtifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Roles present in this set, in commit order.
    pub fn roles(&self) -> Vec<ArtifactRole> {
        self.artifacts.iter().map(|a| a.role).collect()
    }
}

impl IntoIterator for ArtifactSet {
    type Item = EncodedArtifact;
    type IntoIter = std::vec::IntoIter<EncodedArtifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_iter()
    }
}

/// Strip the extension from an uploaded filename.
///
/// Falls back to `"image"` when nothing usable remains.
pub fn filename_stem(filename: &str) -> &str {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    };
    if stem.is_empty() {
        "image"
    } else {
        stem
    }
}

/// Filename for a derived layer: `{role}_{stem}.png`.
pub fn derived_filename(role: ArtifactRole, original: &str) -> String {
    format!("{}_{}.png", role, filename_stem(original))
}
