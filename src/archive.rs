//! All-or-nothing archive expansion.
//!
//! Users may upload a tar (optionally gzip-compressed) holding many images.
//! The extractor flattens it into the directory it was uploaded to, where the
//! files are picked up by the normal placement pass. Directory components
//! inside the archive are discarded.
//!
//! An archive is admitted as a whole or not at all. Every entry must be a
//! regular file whose basename passes the [naming grammar](crate::naming)
//! for the directory's user, and must not clobber a file already in the
//! upload directory. If any entry fails, every file written so far is
//! removed and the archive is left where it is.
//!
//! Each archive is attempted once per process run: the [`RetryCache`] marks
//! it on first sight whatever the outcome, so a rejected archive stays on
//! disk untouched until the ingester restarts.

use crate::naming::{self, ParseError};
use crate::retry::RetryCache;
use crate::scan::{self, ArchiveKind};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::EntryType;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("not an archive: {0}")]
    NotArchive(PathBuf),
}

/// Why a single archive entry disqualified its archive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryProblem {
    #[error("{0}: not a regular file")]
    NotRegular(String),
    #[error("{entry}: {error}")]
    BadName { entry: String, error: ParseError },
    #[error("{0}: would overwrite an existing file")]
    Exists(String),
}

/// What happened to one archive.
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// All entries written; the archive was retired.
    Extracted { archive: PathBuf, files: Vec<PathBuf> },
    /// Entries failed validation; nothing left behind, archive untouched.
    Rejected {
        archive: PathBuf,
        problems: Vec<EntryProblem>,
    },
    /// The archive could not be read or written out; nothing left behind.
    Failed { archive: PathBuf, error: ArchiveError },
}

impl ArchiveOutcome {
    pub fn archive(&self) -> &Path {
        match self {
            ArchiveOutcome::Extracted { archive, .. }
            | ArchiveOutcome::Rejected { archive, .. }
            | ArchiveOutcome::Failed { archive, .. } => archive,
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, ArchiveOutcome::Extracted { .. })
    }
}

/// Expand every not-yet-seen archive in `dir`.
///
/// Only listing `dir` itself can fail; per-archive failures are reported in
/// the returned outcomes.
pub fn extract_archives(
    dir: &Path,
    assume_user: Option<&str>,
    cache: &mut RetryCache,
    archive_done: bool,
) -> io::Result<Vec<ArchiveOutcome>> {
    let mut outcomes = Vec::new();
    for archive in scan::archives_in(dir)? {
        let archive = crate::retry::canonicalize(&archive);
        if !cache.try_once(&archive) {
            debug!(archive = %archive.display(), "ignoring tried archive");
            continue;
        }
        info!(archive = %archive.display(), "examining archive");
        let outcome = extract_one(&archive, dir, assume_user, archive_done);
        match &outcome {
            ArchiveOutcome::Extracted { files, .. } => {
                info!(archive = %archive.display(), files = files.len(), "archive extracted");
            }
            ArchiveOutcome::Rejected { problems, .. } => {
                for problem in problems {
                    warn!(archive = %archive.display(), %problem, "bad archive entry");
                }
                warn!(archive = %archive.display(), "aborted archive, left in place");
            }
            ArchiveOutcome::Failed { error, .. } => {
                warn!(archive = %archive.display(), %error, "archive extraction failed");
            }
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Extract a single archive into `dest_dir`, all or nothing.
pub fn extract_one(
    archive: &Path,
    dest_dir: &Path,
    assume_user: Option<&str>,
    archive_done: bool,
) -> ArchiveOutcome {
    let mut written = Vec::new();
    let result = unpack_flat(archive, dest_dir, assume_user, &mut written);

    match result {
        Ok(problems) if problems.is_empty() => {
            if let Err(e) = scan::retire_upload(archive, archive_done) {
                // The files are out and valid; a leftover archive is only
                // skipped for the rest of this run.
                warn!(archive = %archive.display(), error = %e, "could not retire archive");
            }
            ArchiveOutcome::Extracted {
                archive: archive.to_path_buf(),
                files: written,
            }
        }
        Ok(problems) => {
            remove_written(&written);
            ArchiveOutcome::Rejected {
                archive: archive.to_path_buf(),
                problems,
            }
        }
        Err(error) => {
            remove_written(&written);
            ArchiveOutcome::Failed {
                archive: archive.to_path_buf(),
                error,
            }
        }
    }
}

/// Write every acceptable entry and collect the problems with the others.
///
/// Paths are pushed to `written` before their contents are copied, so a
/// failure halfway through a file still gets it cleaned up.
fn unpack_flat(
    archive: &Path,
    dest_dir: &Path,
    assume_user: Option<&str>,
    written: &mut Vec<PathBuf>,
) -> Result<Vec<EntryProblem>, ArchiveError> {
    let kind = scan::archive_kind(archive)
        .ok_or_else(|| ArchiveError::NotArchive(archive.to_path_buf()))?;
    let file = File::open(archive)?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
    };
    let mut tar = tar::Archive::new(reader);

    let mut problems = Vec::new();
    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_name = entry.path()?.to_string_lossy().to_string();
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() || matches!(entry_type, EntryType::XGlobalHeader) {
            continue;
        }
        if !entry_type.is_file() {
            problems.push(EntryProblem::NotRegular(entry_name));
            continue;
        }

        let basename = match Path::new(&entry_name).file_name() {
            Some(b) => b.to_string_lossy().to_string(),
            None => {
                problems.push(EntryProblem::NotRegular(entry_name));
                continue;
            }
        };
        if let Err(error) = naming::parse_basename(&basename, assume_user) {
            problems.push(EntryProblem::BadName {
                entry: entry_name,
                error,
            });
            continue;
        }

        let dest = dest_dir.join(&basename);
        if dest.exists() {
            problems.push(EntryProblem::Exists(entry_name));
            continue;
        }
        // No point writing more once the archive is doomed
        if !problems.is_empty() {
            continue;
        }

        debug!(file = %dest.display(), "writing");
        let mut out = File::create_new(&dest)?;
        written.push(dest);
        io::copy(&mut entry, &mut out)?;
    }
    Ok(problems)
}

fn remove_written(written: &[PathBuf]) {
    for path in written {
        match fs::remove_file(path) {
            Ok(()) => debug!(file = %path.display(), "removed partial extraction"),
            Err(e) => warn!(file = %path.display(), error = %e, "could not remove partial extraction"),
        }
    }
}
