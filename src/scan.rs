//! Upload directory discovery.
//!
//! The upload tree is flat with one level of user directories:
//!
//! ```text
//! upload/                              # global directory
//! ├── intel_8086_alice_top.jpg         # user named in the file
//! ├── batch.tar                        # archive, expanded in place
//! ├── alice/                           # user directory
//! │   ├── intel_8086_top.jpg           # legacy name, user from directory
//! │   └── done/                        # archived uploads (archive_done)
//! └── done/                            # reserved
//! ```
//!
//! Hidden entries (leading `.`) are skipped everywhere so that uploads still
//! being written under a temporary dot-name are not picked up half-done.
//! Listings are sorted to keep logs stable; nothing depends on the order.

use crate::naming::RESERVED_DONE;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// How an archive is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
}

/// Classify `path` by suffix (`.tar`, `.tar.gz`, `.tgz`). `None` for anything
/// that is not an archive.
pub fn archive_kind(path: &Path) -> Option<ArchiveKind> {
    let name = path.file_name()?.to_string_lossy();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if name.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

fn collect_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .map(|n| !n.to_string_lossy().starts_with('.'))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();
    Ok(entries)
}

/// Archives directly inside `dir`.
pub fn archives_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(collect_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && archive_kind(p).is_some())
        .collect())
}

/// Regular files directly inside `dir` that are upload candidates.
pub fn files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(collect_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && archive_kind(p).is_none())
        .collect())
}

/// Subdirectories of `dir` that may be user directories.
///
/// The reserved `done` directory is excluded; user-name validation is left
/// to the caller so it can blacklist bad names.
pub fn subdirs_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(collect_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .filter(|p| p.file_name().map(|n| n != RESERVED_DONE).unwrap_or(false))
        .collect())
}

/// Dispose of a fully handled upload.
///
/// Deletes it, or with `archive_done` moves it into a `done/` directory next
/// to it. Returns the archived location, if any.
pub fn retire_upload(path: &Path, archive_done: bool) -> io::Result<Option<PathBuf>> {
    if !archive_done {
        fs::remove_file(path)?;
        return Ok(None);
    }
    let parent = path.parent().unwrap_or(Path::new("."));
    let done_dir = parent.join(RESERVED_DONE);
    fs::create_dir_all(&done_dir)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "upload has no file name"))?;
    let target = done_dir.join(file_name);
    fs::rename(path, &target)?;
    Ok(Some(target))
}
