//! Shared types used across ingestion stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of artifact a manifest record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Flat source image in the chip's `single/` directory.
    Image,
    /// Published map directory generated from an image.
    Map,
}

/// Lifecycle status of an upload moving through placement.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Done,
    Error,
    Collision,
}

impl EntryStatus {
    pub fn is_terminal(self) -> bool {
        self != EntryStatus::Pending
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Pending => "Pending",
            EntryStatus::Done => "Done",
            EntryStatus::Error => "Error",
            EntryStatus::Collision => "Collision",
        };
        f.write_str(s)
    }
}

/// What the publisher reports after writing (or finding) a wiki page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    /// Rendered page text.
    #[serde(default)]
    pub page_text: String,
    /// Wiki page id.
    pub wiki_page: String,
    pub wiki_url: String,
    /// URL of the published map directory.
    pub map_url: String,
    /// The page was written by this call.
    #[serde(default)]
    pub wrote: bool,
    /// The page already existed before this call.
    #[serde(default)]
    pub existed: bool,
}
