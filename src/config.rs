//! Ingester configuration.
//!
//! Everything the ingester needs to know about its surroundings is gathered
//! into one [`IngestConfig`] at startup and passed down. No stage reads the
//! environment on its own.
//!
//! ## Layers
//!
//! ```text
//! stock defaults  →  config.toml (--config)  →  MAPDROP_* environment
//! ```
//!
//! Later layers override earlier ones. The file is sparse: specify only the
//! keys you want to change. Unknown keys are rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! upload_dir = "/var/lib/mapdrop/upload"   # MAPDROP_UPLOAD_DIR
//! tmp_dir = "/var/lib/mapdrop/tmp"         # MAPDROP_TMP_DIR (wiped on start and exit)
//! user_log_dir = "/var/lib/mapdrop/users"  # MAPDROP_USER_DIR
//! map_dir = "/var/www/map"                 # MAPDROP_MAP_DIR
//! poll_interval_secs = 3
//! archive_done = false                     # move finished uploads to done/ instead of deleting
//! dev = false                              # skip the reindex trigger
//!
//! [commands]
//! sanity = ["identify"]
//! convert = ["prawnmap", "--threads", "4"]
//! publish = ["img2doku", "--write", "--write-lazy", "--json"]
//! reindex = ["php", "/var/www/archive/bin/indexer.php"]
//!
//! [copyright]
//! alice = "Alice Example, CC BY 4.0"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_UPLOAD_DIR: &str = "MAPDROP_UPLOAD_DIR";
pub const ENV_TMP_DIR: &str = "MAPDROP_TMP_DIR";
pub const ENV_USER_DIR: &str = "MAPDROP_USER_DIR";
pub const ENV_MAP_DIR: &str = "MAPDROP_MAP_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete ingester configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Global upload directory; user directories live directly inside it.
    pub upload_dir: PathBuf,
    /// Scratch directory handed to external tools. Recreated at start.
    pub tmp_dir: PathBuf,
    /// Where per-user log pages (`<user>.txt`) are appended.
    pub user_log_dir: PathBuf,
    /// Root of the published map tree (`<vendor>/<chipid>/...`).
    pub map_dir: PathBuf,
    /// Pause between scheduler iterations.
    pub poll_interval_secs: u64,
    /// Move completed uploads to `done/` instead of deleting them.
    pub archive_done: bool,
    /// Development mode: never trigger the reindexer.
    pub dev: bool,
    pub commands: CommandsConfig,
    /// Copyright holder per user. Users not listed are credited by name.
    pub copyright: BTreeMap<String, String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("/var/lib/mapdrop/upload"),
            tmp_dir: PathBuf::from("/var/lib/mapdrop/tmp"),
            user_log_dir: PathBuf::from("/var/lib/mapdrop/users"),
            map_dir: PathBuf::from("/var/www/map"),
            poll_interval_secs: 3,
            archive_done: false,
            dev: false,
            commands: CommandsConfig::default(),
            copyright: BTreeMap::new(),
        }
    }
}

/// Argv prefixes of the external tools. See [`crate::toolchain`] for the
/// arguments appended to each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    pub sanity: Vec<String>,
    pub convert: Vec<String>,
    pub publish: Vec<String>,
    pub reindex: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect();
        Self {
            sanity: argv(&["identify"]),
            convert: argv(&["prawnmap", "--threads", "4"]),
            publish: argv(&["img2doku", "--write", "--write-lazy", "--json"]),
            reindex: argv(&["php", "/var/www/archive/bin/indexer.php"]),
        }
    }
}

impl IngestConfig {
    /// Validate values that serde cannot check.
    ///
    /// The scratch directory is deleted recursively, so it must not contain
    /// or sit inside any of the other roots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let roots = [
            ("upload_dir", &self.upload_dir),
            ("tmp_dir", &self.tmp_dir),
            ("user_log_dir", &self.user_log_dir),
            ("map_dir", &self.map_dir),
        ];
        for (name, path) in roots {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{name} must not be empty")));
            }
        }
        for (name, path) in &roots[..] {
            if *name == "tmp_dir" {
                continue;
            }
            if path.starts_with(&self.tmp_dir) || self.tmp_dir.starts_with(path) {
                return Err(ConfigError::Validation(format!(
                    "tmp_dir must not overlap {name}"
                )));
            }
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        for (user, holder) in &self.copyright {
            if holder.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "copyright holder for {user} must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Override the four directory roots from `MAPDROP_*` variables.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets = [
            (ENV_UPLOAD_DIR, &mut self.upload_dir),
            (ENV_TMP_DIR, &mut self.tmp_dir),
            (ENV_USER_DIR, &mut self.user_log_dir),
            (ENV_MAP_DIR, &mut self.map_dir),
        ];
        for (var, target) in targets {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                *target = PathBuf::from(value);
            }
        }
    }

    /// Copyright holder credited for `user`'s uploads.
    pub fn copyright_holder<'a>(&'a self, user: &'a str) -> &'a str {
        self.copyright.get(user).map(String::as_str).unwrap_or(user)
    }

    /// Copyright line passed to the converter, e.g. `&copy; 2026 alice`.
    pub fn copyright_line(&self, user: &str, year: i32) -> String {
        format!("&copy; {year} {}", self.copyright_holder(user))
    }

    /// Path of `user`'s log page.
    pub fn user_page(&self, user: &str) -> PathBuf {
        self.user_log_dir.join(format!("{user}.txt"))
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(IngestConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Merge the layers, deserialize, and validate.
pub fn resolve_config(
    overlay: Option<toml::Value>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<IngestConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: IngestConfig = merged.try_into()?;
    config.apply_env(env);
    config.validate()?;
    Ok(config)
}

/// Load the configuration for this process.
///
/// An explicitly named file must exist; without one, stock defaults and the
/// environment are used.
pub fn load_config(path: Option<&Path>) -> Result<IngestConfig, ConfigError> {
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(overlay, |var| std::env::var(var).ok())
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# mapdrop configuration
# =====================
# All options are optional. Values shown are the defaults.
# The four directory roots can also be set with MAPDROP_UPLOAD_DIR,
# MAPDROP_TMP_DIR, MAPDROP_USER_DIR and MAPDROP_MAP_DIR, which win over
# this file.

# Global upload directory. Files here must carry the user in their name
# (vendor_chipid_user_flavor.ext). Each subdirectory named after a user is
# scanned as that user's upload area.
upload_dir = "/var/lib/mapdrop/upload"

# Scratch directory for external tools. Deleted and recreated at start,
# deleted on exit. Must not overlap any other root.
tmp_dir = "/var/lib/mapdrop/tmp"

# Directory holding one <user>.txt log page per user. Every published map
# appends a link line.
user_log_dir = "/var/lib/mapdrop/users"

# Root of the published map tree: <map_dir>/<vendor>/<chipid>/
map_dir = "/var/www/map"

# Seconds to sleep between scans.
poll_interval_secs = 3

# Move completed uploads into a done/ subdirectory instead of deleting them.
archive_done = false

# Development mode: never run the reindex command.
dev = false

# ---------------------------------------------------------------------------
# External commands (argv prefixes)
# ---------------------------------------------------------------------------
[commands]
# Called as: <sanity...> <file>
sanity = ["identify"]
# Called as: <convert...> -c <copyright> <files...>
convert = ["prawnmap", "--threads", "4"]
# Called as: <publish...> --collect <user> <files...>; prints JSON on stdout
publish = ["img2doku", "--write", "--write-lazy", "--json"]
# Called with no extra arguments after an iteration that published something
reindex = ["php", "/var/www/archive/bin/indexer.php"]

# ---------------------------------------------------------------------------
# Copyright holders
# ---------------------------------------------------------------------------
# Maps a user to the holder named in the copyright line stamped on their
# maps ("&copy; <year> <holder>"). Unlisted users are credited by name.
[copyright]
"##
}
