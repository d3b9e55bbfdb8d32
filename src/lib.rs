//! # mapdrop
//!
//! Upload ingester for a die-shot map archive. Contributors drop images
//! (or tar archives of images) into a watched directory; mapdrop validates
//! their names, stages them into the published map tree, runs the external
//! converter and wiki publisher, and records provenance per chip.
//!
//! # Architecture: Polling Pipeline
//!
//! ```text
//! Scheduler ─► RetryCache ─► ArchiveExtractor ─► NameGrammar ─► Placement ─► Manifest
//!  (scheduler)   (retry)        (archive)          (naming)      (pipeline)   (manifest)
//! ```
//!
//! Each iteration sweeps the global upload directory, then each user
//! directory. Archives are flattened into the directory they arrived in and
//! the resulting files go through placement in the same sweep. Anything that
//! reached `Done` triggers a single reindex at the end of the iteration.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scheduler`] | Polling loop, iteration report, scratch directory guard |
//! | [`pipeline`] | Per-upload state machine: stage, convert, publish, record |
//! | [`archive`] | All-or-nothing tar / tar.gz expansion |
//! | [`naming`] | Upload file name grammar and user name rules |
//! | [`manifest`] | Crash-safe per-chip `.manifest` JSON |
//! | [`retry`] | Attempt-once memory for paths, plus the user blacklist |
//! | [`scan`] | Upload directory listing and retirement of finished uploads |
//! | [`toolchain`] | Trait over the external programs, and its command-line implementation |
//! | [`config`] | Layered `config.toml` + environment loading and validation |
//! | [`types`] | Statuses and records shared between modules |
//! | [`output`] | CLI output formatting for `check` and single-shot runs |
//!
//! # Design Decisions
//!
//! ## Never Overwrite, Never Lose
//!
//! A destination that already exists is a collision: placement stops before
//! touching anything and leaves the upload where it is. Once placement has
//! written something, any later failure removes exactly what it wrote.
//! Uploads are only deleted (or archived to `done/`) after every record has
//! been written.
//!
//! ## Attempt Once per Run
//!
//! Failed uploads are not retried until the process restarts. The retry
//! memory lives in the process: restarting the ingester is how an
//! operator asks for a retry after fixing the cause.
//!
//! ## External Tools Behind a Trait
//!
//! Conversion, publishing and reindexing are separate programs. The
//! [`toolchain::Toolchain`] trait keeps placement testable with a recording
//! mock and keeps the command lines in configuration.

pub mod archive;
pub mod config;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod retry;
pub mod scan;
pub mod scheduler;
pub mod toolchain;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
