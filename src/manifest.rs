//! Per-chip provenance manifest.
//!
//! Each chip directory (`<map>/<vendor>/<chipid>/`) carries a `.manifest`
//! JSON document recording who contributed every artifact in it:
//!
//! ```json
//! {
//!     "files": {
//!         "alice_top": {
//!             "collection": "alice",
//!             "copyright_year": 2026,
//!             "type": "map"
//!         },
//!         "single/intel_8086_alice_top.jpg": {
//!             "collection": "alice",
//!             "copyright_year": 2026,
//!             "type": "image"
//!         }
//!     }
//! }
//! ```
//!
//! Keys are paths relative to the chip directory. Top-level keys other than
//! `files` are preserved untouched.
//!
//! ## Write protocol
//!
//! The manifest is the only record of copyright ownership, so a write must
//! never leave a truncated document behind:
//!
//! 1. Serialize the merged document into `.manifest.tmp` and sync it.
//! 2. Copy the current `.manifest` (if any) to `.manifest.old`, replacing
//!    the previous backup.
//! 3. Rename `.manifest.tmp` over `.manifest`.
//!
//! Rename within one directory is atomic, so a reader sees either the old or
//! the new document. A crash before step 3 leaves the previous manifest
//! byte-for-byte intact plus an orphaned temp file, which the next write
//! simply overwrites. Steps 1 and 2–3 are exposed separately as
//! [`prepare`] and [`PreparedWrite::commit`].

use crate::types::ArtifactKind;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Manifest file name inside a chip directory.
pub const MANIFEST_FILENAME: &str = ".manifest";
const TMP_SUFFIX: &str = ".tmp";
const BACKUP_SUFFIX: &str = ".old";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest keys must be relative paths: {0}")]
    AbsolutePath(String),
}

/// Provenance of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub collection: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub copyright_year: i32,
}

impl ManifestEntry {
    /// Entry stamped with the current calendar year.
    pub fn new(collection: &str, kind: ArtifactKind) -> Self {
        Self {
            collection: collection.to_string(),
            kind,
            copyright_year: chrono::Local::now().year(),
        }
    }
}

/// The whole manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    /// Load the manifest of `directory`, or an empty one if none exists yet.
    ///
    /// A manifest that exists but does not parse is an error: it is never
    /// replaced by an empty document.
    pub fn load(directory: &Path) -> Result<Self, ManifestError> {
        let path = manifest_path(directory);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|source| ManifestError::Json { path, source })
    }

    /// Deterministic rendering: sorted keys, four-space indent, trailing newline.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        // Round-trip through Value so flattened keys sort with `files`
        let value = serde_json::to_value(self)?;
        value.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }
}

/// A merged manifest written to its temp file but not yet in place.
///
/// Dropping it without calling [`commit`](Self::commit) leaves the live
/// manifest untouched and the temp file orphaned.
#[derive(Debug)]
#[must_use = "the manifest is not updated until commit() is called"]
pub struct PreparedWrite {
    directory: PathBuf,
    tmp_path: PathBuf,
}

impl PreparedWrite {
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Back up the current manifest and move the new one into place.
    pub fn commit(self) -> Result<(), ManifestError> {
        let live = manifest_path(&self.directory);
        if live.exists() {
            let backup = backup_path(&self.directory);
            let backup_tmp = with_suffix(&backup, TMP_SUFFIX);
            fs::copy(&live, &backup_tmp)?;
            fs::rename(&backup_tmp, &backup)?;
        }
        fs::rename(&self.tmp_path, &live)?;
        debug!(manifest = %live.display(), "manifest committed");
        Ok(())
    }
}

/// Merge one record into the manifest of `directory` and write it to the
/// temp file. See the [module docs](self) for the protocol.
pub fn prepare(
    directory: &Path,
    relative_path: &str,
    entry: ManifestEntry,
) -> Result<PreparedWrite, ManifestError> {
    if relative_path.starts_with('/') || Path::new(relative_path).is_absolute() {
        return Err(ManifestError::AbsolutePath(relative_path.to_string()));
    }

    let mut manifest = Manifest::load(directory)?;
    manifest.files.insert(relative_path.to_string(), entry);

    let tmp_path = with_suffix(&manifest_path(directory), TMP_SUFFIX);
    let json = manifest.to_json().map_err(|source| ManifestError::Json {
        path: tmp_path.clone(),
        source,
    })?;
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;

    Ok(PreparedWrite {
        directory: directory.to_path_buf(),
        tmp_path,
    })
}

/// Insert or overwrite `relative_path` in the manifest of `directory`.
pub fn merge(
    directory: &Path,
    relative_path: &str,
    entry: ManifestEntry,
) -> Result<(), ManifestError> {
    prepare(directory, relative_path, entry)?.commit()
}

pub fn manifest_path(directory: &Path) -> PathBuf {
    directory.join(MANIFEST_FILENAME)
}

pub fn backup_path(directory: &Path) -> PathBuf {
    with_suffix(&manifest_path(directory), BACKUP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(user: &str, kind: ArtifactKind, year: i32) -> ManifestEntry {
        ManifestEntry {
            collection: user.into(),
            kind,
            copyright_year: year,
        }
    }

    #[test]
    fn merge_creates_manifest() {
        let tmp = TempDir::new().unwrap();
        merge(tmp.path(), "single/a.jpg", entry("alice", ArtifactKind::Image, 2024)).unwrap();

        let m = Manifest::load(tmp.path()).unwrap();
        assert_eq!(m.files.len(), 1);
        assert_eq!(m.files["single/a.jpg"], entry("alice", ArtifactKind::Image, 2024));
        assert!(!backup_path(tmp.path()).exists());
    }

    #[test]
    fn merge_overwrites_same_key_and_keeps_others() {
        let tmp = TempDir::new().unwrap();
        merge(tmp.path(), "a", entry("alice", ArtifactKind::Image, 2020)).unwrap();
        merge(tmp.path(), "b", entry("bob", ArtifactKind::Map, 2021)).unwrap();
        merge(tmp.path(), "a", entry("carol", ArtifactKind::Image, 2022)).unwrap();

        let m = Manifest::load(tmp.path()).unwrap();
        assert_eq!(m.files.len(), 2);
        assert_eq!(m.files["a"].collection, "carol");
        assert_eq!(m.files["b"].kind, ArtifactKind::Map);
    }

    #[test]
    fn absolute_key_rejected_without_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let err = merge(tmp.path(), "/etc/passwd", entry("x", ArtifactKind::Image, 2024));
        assert!(matches!(err, Err(ManifestError::AbsolutePath(_))));
        assert!(!manifest_path(tmp.path()).exists());
    }

    #[test]
    fn one_backup_generation_kept() {
        let tmp = TempDir::new().unwrap();
        merge(tmp.path(), "a", entry("alice", ArtifactKind::Image, 2024)).unwrap();
        let first = fs::read(manifest_path(tmp.path())).unwrap();
        merge(tmp.path(), "b", entry("alice", ArtifactKind::Map, 2024)).unwrap();
        assert_eq!(fs::read(backup_path(tmp.path())).unwrap(), first);

        let second = fs::read(manifest_path(tmp.path())).unwrap();
        merge(tmp.path(), "c", entry("alice", ArtifactKind::Map, 2024)).unwrap();
        assert_eq!(fs::read(backup_path(tmp.path())).unwrap(), second);

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
    }

    #[test]
    fn crash_before_commit_leaves_previous_manifest_intact() {
        let tmp = TempDir::new().unwrap();
        merge(tmp.path(), "a", entry("alice", ArtifactKind::Image, 2024)).unwrap();
        let committed = fs::read(manifest_path(tmp.path())).unwrap();

        let prepared = prepare(tmp.path(), "b", entry("bob", ArtifactKind::Map, 2024)).unwrap();
        assert!(prepared.tmp_path().exists());
        drop(prepared);

        assert_eq!(fs::read(manifest_path(tmp.path())).unwrap(), committed);
        let m = Manifest::load(tmp.path()).unwrap();
        assert!(!m.files.contains_key("b"));

        // The orphaned temp file does not block the next write
        merge(tmp.path(), "c", entry("carol", ArtifactKind::Map, 2024)).unwrap();
        let m = Manifest::load(tmp.path()).unwrap();
        assert!(m.files.contains_key("a"));
        assert!(m.files.contains_key("c"));
        assert!(!m.files.contains_key("b"));
    }

    #[test]
    fn serialization_is_sorted_and_indented() {
        let tmp = TempDir::new().unwrap();
        merge(tmp.path(), "z", entry("alice", ArtifactKind::Map, 2024)).unwrap();
        merge(tmp.path(), "a", entry("alice", ArtifactKind::Image, 2024)).unwrap();

        let text = fs::read_to_string(manifest_path(tmp.path())).unwrap();
        assert!(text.starts_with("{\n    \"files\": {\n        \"a\": {"));
        assert!(text.find("\"a\"").unwrap() < text.find("\"z\"").unwrap());
        let collection = text.find("\"collection\"").unwrap();
        let year = text.find("\"copyright_year\"").unwrap();
        let kind = text.find("\"type\"").unwrap();
        assert!(collection < year && year < kind);
    }

    #[test]
    fn unknown_top_level_keys_survive_merge() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            manifest_path(tmp.path()),
            r#"{"files": {}, "note": "hand edited"}"#,
        )
        .unwrap();
        merge(tmp.path(), "a", entry("alice", ArtifactKind::Image, 2024)).unwrap();
        let m = Manifest::load(tmp.path()).unwrap();
        assert_eq!(m.extra["note"], serde_json::json!("hand edited"));
    }

    #[test]
    fn corrupt_manifest_is_an_error_not_a_reset() {
        let tmp = TempDir::new().unwrap();
        fs::write(manifest_path(tmp.path()), "{ not json").unwrap();
        let err = merge(tmp.path(), "a", entry("alice", ArtifactKind::Image, 2024));
        assert!(matches!(err, Err(ManifestError::Json { .. })));
        assert_eq!(fs::read_to_string(manifest_path(tmp.path())).unwrap(), "{ not json");
    }

    #[test]
    fn new_entry_uses_current_year() {
        let e = ManifestEntry::new("alice", ArtifactKind::Image);
        assert_eq!(e.copyright_year, chrono::Local::now().year());
        assert_eq!(e.kind, ArtifactKind::Image);
    }
}
