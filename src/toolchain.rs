//! External collaborators behind one trait.
//!
//! Placement depends on four programs it does not implement:
//!
//! | Operation | Contract |
//! |---|---|
//! | **sanity_check** | exits zero if the staged file is a readable image |
//! | **convert** | renders map tiles from the staged file, stamped with a copyright |
//! | **publish** | writes the wiki page, prints a [`Publication`] as JSON |
//! | **reindex** | refreshes the site search index |
//!
//! [`CommandToolchain`] runs them as configured argv commands with the
//! scratch directory as working directory. Tests use the recording
//! `MockToolchain` instead.

use crate::config::CommandsConfig;
use crate::types::Publication;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("no command configured for {0}")]
    NotConfigured(&'static str),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{program} printed unusable output: {source}")]
    BadOutput {
        program: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Input to the converter.
#[derive(Debug, Clone)]
pub struct ConvertRequest<'a> {
    pub user: &'a str,
    pub files: &'a [PathBuf],
    /// Full copyright line, e.g. `&copy; 2026 Alice Example`.
    pub copyright: &'a str,
}

/// Input to the publisher.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub files: &'a [PathBuf],
    /// Collection (user) the page is filed under.
    pub collection: &'a str,
}

/// The programs placement and scheduling call out to.
pub trait Toolchain {
    /// Fail fast on files that are not images (HTML error pages and the like).
    fn sanity_check(&self, path: &Path) -> Result<(), ToolError>;

    /// Generate map artifacts from staged files.
    fn convert(&self, request: &ConvertRequest<'_>) -> Result<(), ToolError>;

    /// Write the wiki page for staged files.
    fn publish(&self, request: &PublishRequest<'_>) -> Result<Publication, ToolError>;

    /// Refresh the search index after new content appeared.
    fn reindex(&self) -> Result<(), ToolError>;
}

/// Production toolchain: each operation is an external command.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    commands: CommandsConfig,
    work_dir: PathBuf,
}

impl CommandToolchain {
    pub fn new(commands: CommandsConfig, work_dir: &Path) -> Self {
        Self {
            commands,
            work_dir: work_dir.to_path_buf(),
        }
    }

    fn run(
        &self,
        what: &'static str,
        argv: &[String],
        extra: Vec<OsString>,
    ) -> Result<Output, ToolError> {
        let (program, base_args) = argv.split_first().ok_or(ToolError::NotConfigured(what))?;
        debug!(tool = what, program = %program, args = ?extra, "running");

        let output = Command::new(program)
            .args(base_args)
            .args(&extra)
            .current_dir(&self.work_dir)
            .env("TMPDIR", &self.work_dir)
            .output()
            .map_err(|source| ToolError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: program.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl Toolchain for CommandToolchain {
    fn sanity_check(&self, path: &Path) -> Result<(), ToolError> {
        self.run("sanity check", &self.commands.sanity, vec![path.into()])?;
        Ok(())
    }

    fn convert(&self, request: &ConvertRequest<'_>) -> Result<(), ToolError> {
        let mut args: Vec<OsString> = vec!["-c".into(), request.copyright.into()];
        args.extend(request.files.iter().map(|f| f.as_os_str().to_os_string()));
        self.run("convert", &self.commands.convert, args)?;
        Ok(())
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Publication, ToolError> {
        let mut args: Vec<OsString> = vec!["--collect".into(), request.collection.into()];
        args.extend(request.files.iter().map(|f| f.as_os_str().to_os_string()));
        let output = self.run("publish", &self.commands.publish, args)?;
        serde_json::from_slice(&output.stdout).map_err(|source| ToolError::BadOutput {
            program: self.commands.publish[0].clone(),
            source,
        })
    }

    fn reindex(&self) -> Result<(), ToolError> {
        self.run("reindex", &self.commands.reindex, Vec::new())?;
        Ok(())
    }
}
