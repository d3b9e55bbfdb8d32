//! Polling loop over the upload tree.
//!
//! One iteration sweeps the global upload directory and then every user
//! directory inside it:
//!
//! ```text
//! run_one_iteration
//! ├── sweep upload/            global cache, no assumed user
//! │   ├── extract archives
//! │   └── place new files
//! ├── sweep upload/<user>/     user cache, assumed user = <user>
//! │   └── ...                  (invalid user names are blacklisted)
//! └── reindex                  once, if anything reached Done
//! ```
//!
//! The two [`RetryCache`]s live as long as the [`Scheduler`], so a file is
//! attempted once per process run no matter how it ended. Failures inside a
//! user directory are logged and the sweep moves on; a failure of the
//! iteration itself is returned to the driver, which only gives up on it in
//! single-shot mode.

use crate::archive::{self, ArchiveOutcome};
use crate::config::IngestConfig;
use crate::naming;
use crate::pipeline::{Entry, Placement};
use crate::retry::{self, RetryCache};
use crate::scan;
use crate::toolchain::{CommandToolchain, ToolError, Toolchain};
use crate::types::EntryStatus;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Longest stretch the poll sleep goes without checking for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot prepare scratch directory {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reindex failed: {0}")]
    Reindex(#[from] ToolError),
}

/// What one iteration did.
#[derive(Debug, Default)]
pub struct IterationReport {
    /// Entries that reached a terminal status, in processing order.
    pub entries: Vec<Entry>,
    pub archives: Vec<ArchiveOutcome>,
    /// User directories blacklisted during this iteration.
    pub invalid_users: Vec<String>,
    pub reindexed: bool,
}

impl IterationReport {
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn archives_extracted(&self) -> usize {
        self.archives.iter().filter(|a| a.is_extracted()).count()
    }

    pub fn archives_rejected(&self) -> usize {
        self.archives.len() - self.archives_extracted()
    }

    /// New content was published, so the search index is stale.
    pub fn changed(&self) -> bool {
        self.count(EntryStatus::Done) > 0
    }

    pub fn is_idle(&self) -> bool {
        self.entries.is_empty() && self.archives.is_empty() && self.invalid_users.is_empty()
    }
}

/// Scratch directory for external tools, emptied on creation and removed
/// when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create(path: &Path) -> Result<Self, SchedulerError> {
        let scratch_err = |source| SchedulerError::Scratch {
            path: path.to_path_buf(),
            source,
        };
        match fs::remove_dir_all(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale scratch directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(scratch_err(e)),
        }
        fs::create_dir_all(path).map_err(scratch_err)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed scratch directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove scratch directory"),
        }
    }
}

pub struct Scheduler<'a> {
    config: &'a IngestConfig,
    tools: &'a dyn Toolchain,
    global_cache: RetryCache,
    user_cache: RetryCache,
}

impl<'a> Scheduler<'a> {
    pub fn new(config: &'a IngestConfig, tools: &'a dyn Toolchain) -> Self {
        Self {
            config,
            tools,
            global_cache: RetryCache::new(),
            user_cache: RetryCache::new(),
        }
    }

    /// Sweep the upload tree once.
    pub fn run_one_iteration(&mut self) -> Result<IterationReport, SchedulerError> {
        let config = self.config;
        let mut report = IterationReport::default();
        let placement = Placement::new(config, self.tools);
        let upload_dir = &config.upload_dir;
        let archive_done = config.archive_done;

        sweep(
            upload_dir,
            None,
            &mut self.global_cache,
            &placement,
            archive_done,
            &mut report,
        )
        .map_err(|source| SchedulerError::Scan {
            path: upload_dir.clone(),
            source,
        })?;

        let user_dirs = scan::subdirs_in(upload_dir).map_err(|source| SchedulerError::Scan {
            path: upload_dir.clone(),
            source,
        })?;
        for dir in user_dirs {
            let dir = retry::canonicalize(&dir);
            if !self.user_cache.check_only(&dir) {
                debug!(dir = %dir.display(), "ignoring rejected directory");
                continue;
            }
            let Some(user) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if user == naming::RESERVED_DONE {
                continue;
            }
            if !naming::validate_username(&user) {
                warn!(dir = %dir.display(), "invalid user name, ignoring directory");
                self.user_cache.blacklist(&dir);
                report.invalid_users.push(user);
                continue;
            }
            if let Err(e) = sweep(
                &dir,
                Some(&user),
                &mut self.user_cache,
                &placement,
                archive_done,
                &mut report,
            ) {
                warn!(dir = %dir.display(), error = %e, "failed to scan user directory");
            }
        }

        if report.changed() {
            if config.dev {
                info!("dev mode, skipping reindex");
            } else {
                info!("reindexing");
                self.tools.reindex()?;
                report.reindexed = true;
            }
        }
        Ok(report)
    }

    /// Iterate until stopped.
    ///
    /// With `once`, a single iteration runs and its error (if any) is
    /// returned. Otherwise iteration errors are logged and the loop goes on
    /// after the poll interval until `shutdown` is set, then the report of
    /// the last successful iteration is returned.
    pub fn run(
        &mut self,
        once: bool,
        shutdown: &AtomicBool,
    ) -> Result<IterationReport, SchedulerError> {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        info!(upload_dir = %self.config.upload_dir.display(), "watching");
        let mut last_report = IterationReport::default();
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("shutting down");
                return Ok(last_report);
            }
            match self.run_one_iteration() {
                Ok(report) if once => return Ok(report),
                Ok(report) => {
                    if !report.is_idle() {
                        info!(
                            done = report.count(EntryStatus::Done),
                            errors = report.count(EntryStatus::Error),
                            collisions = report.count(EntryStatus::Collision),
                            "iteration complete"
                        );
                    }
                    last_report = report;
                }
                Err(e) if once => return Err(e),
                Err(e) => error!(error = %e, "iteration failed"),
            }
            sleep_unless_stopped(interval, shutdown);
        }
    }
}

/// Sleep for `interval`, waking early once `shutdown` is set.
fn sleep_unless_stopped(interval: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while !shutdown.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        std::thread::sleep(left.min(SHUTDOWN_POLL));
    }
}

/// Extract archives in `dir`, then place every file not tried before.
fn sweep(
    dir: &Path,
    assume_user: Option<&str>,
    cache: &mut RetryCache,
    placement: &Placement<'_>,
    archive_done: bool,
    report: &mut IterationReport,
) -> io::Result<()> {
    debug!(dir = %dir.display(), user = ?assume_user, "checking");
    report
        .archives
        .extend(archive::extract_archives(dir, assume_user, cache, archive_done)?);

    for file in scan::files_in(dir)? {
        let file = retry::canonicalize(&file);
        if !cache.try_once(&file) {
            continue;
        }
        let mut entry = Entry::new(&file, assume_user);
        placement.process(&mut entry);
        report.entries.push(entry);
    }
    Ok(())
}

/// Run the ingester against the real toolchain.
///
/// The scratch directory exists for exactly as long as this call, which
/// returns once `shutdown` is set (usually by a signal handler).
pub fn run_service(
    config: &IngestConfig,
    once: bool,
    shutdown: &AtomicBool,
) -> Result<IterationReport, SchedulerError> {
    let scratch = ScratchDir::create(&config.tmp_dir)?;
    let tools = CommandToolchain::new(config.commands.clone(), scratch.path());
    Scheduler::new(config, &tools).run(once, shutdown)
}
