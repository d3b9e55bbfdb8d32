//! Shared test utilities for the mapdrop test suite.
//!
//! Provides a throwaway set of directory roots wired into an
//! [`IngestConfig`], plus builders for uploads and tar archives.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let roots = setup_roots();
//! let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");
//! write_tar(&roots.config.upload_dir.join("batch.tar"), &[("mos_6502_alice_a.jpg", b"x")]);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::IngestConfig;
use crate::manifest::Manifest;

// =========================================================================
// Fixture setup
// =========================================================================

/// A temp directory holding all four roots, and a config pointing at them.
pub struct Roots {
    pub tmp: TempDir,
    pub config: IngestConfig,
}

impl Roots {
    /// Chip directory of `vendor/chipid` under the map root.
    pub fn chip_dir(&self, vendor: &str, chipid: &str) -> PathBuf {
        self.config.map_dir.join(vendor).join(chipid)
    }

    /// Upload directory of `user`, created on demand.
    pub fn user_dir(&self, user: &str) -> PathBuf {
        let dir = self.config.upload_dir.join(user);
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

/// Create `upload/`, `tmp/`, `users/` and `map/` in a fresh temp directory.
///
/// `tmp/` is deliberately left for the scheduler to create.
pub fn setup_roots() -> Roots {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config = IngestConfig {
        upload_dir: root.join("upload"),
        tmp_dir: root.join("tmp"),
        user_log_dir: root.join("users"),
        map_dir: root.join("map"),
        ..IngestConfig::default()
    };
    fs::create_dir_all(&config.upload_dir).unwrap();
    fs::create_dir_all(&config.map_dir).unwrap();
    Roots { tmp, config }
}

/// Write a small fake image named `name` into `dir`.
pub fn write_upload(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("image bytes of {name}")).unwrap();
    path
}

pub fn read_manifest(chip_dir: &Path) -> Manifest {
    Manifest::load(chip_dir).unwrap()
}

// =========================================================================
// Archives
// =========================================================================

fn regular_header(len: usize) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(len as u64);
    header.set_mode(0o644);
    header
}

fn append_files<W: std::io::Write>(builder: &mut tar::Builder<W>, files: &[(&str, &[u8])]) {
    for (name, data) in files {
        let mut header = regular_header(data.len());
        builder.append_data(&mut header, name, *data).unwrap();
    }
}

/// Write a plain tar at `path` containing `files` as regular entries.
pub fn write_tar(path: &Path, files: &[(&str, &[u8])]) {
    let mut builder = tar::Builder::new(fs::File::create(path).unwrap());
    append_files(&mut builder, files);
    builder.into_inner().unwrap();
}

/// Same as [`write_tar`], gzip-compressed.
pub fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    let encoder = flate2::write::GzEncoder::new(
        fs::File::create(path).unwrap(),
        flate2::Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    append_files(&mut builder, files);
    builder.into_inner().unwrap().finish().unwrap();
}

/// Write a tar with one regular file followed by a symlink entry.
pub fn write_tar_with_symlink(path: &Path, file: (&str, &[u8]), link: (&str, &str)) {
    let mut builder = tar::Builder::new(fs::File::create(path).unwrap());
    append_files(&mut builder, &[file]);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    header.set_link_name(link.1).unwrap();
    builder
        .append_data(&mut header, link.0, std::io::empty())
        .unwrap();
    builder.into_inner().unwrap();
}
