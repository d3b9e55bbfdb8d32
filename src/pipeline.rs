//! Per-file placement state machine.
//!
//! Every candidate upload becomes an [`Entry`] that [`Placement::process`]
//! drives from `Pending` to exactly one terminal status:
//!
//! ```text
//!            parse ─✗─────────────────────────────────┐
//!              │                                      │
//!        validate user ─✗─────────────────────────────┤
//!              │                                      │
//!     collision check ─✗──► Collision (no side effects)│
//!              │                                      ▼
//!  stage ► sanity ► convert ► publish ► finalize ─✗─► Error (+ cleanup)
//!                                          │
//!                                          ▼
//!                                         Done
//! ```
//!
//! ## Destination layout
//!
//! ```text
//! <map_dir>/<vendor>/<chipid>/
//! ├── .manifest
//! ├── single/<vendor>_<chipid>_<user>_<flavor>.<ext>   # staged copy
//! └── <user>_<flavor>/                                  # written by the publisher
//! ```
//!
//! Both the staged copy and the map directory must be new. If either exists
//! the entry is a `Collision` and nothing is touched, so an earlier
//! publication is never overwritten and never cleaned up by a later one.
//!
//! Once staging has begun, any failure removes the staged copy and the map
//! directory again. Manifest records and the user log are append-only and
//! stay behind.

use crate::config::IngestConfig;
use crate::manifest::{self, ManifestEntry, ManifestError};
use crate::naming::{self, ParseError, UploadName};
use crate::scan;
use crate::toolchain::{ConvertRequest, PublishRequest, ToolError, Toolchain};
use crate::types::{ArtifactKind, EntryStatus};
use chrono::Datelike;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

const SINGLE_DIR: &str = "single";

/// Filesystems with whole-second timestamps round a fresh directory's mtime
/// down past the moment publishing started.
const MTIME_SLACK: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("bad file name: {0}")]
    Parse(#[from] ParseError),
    #[error("invalid user name: {0}")]
    InvalidUser(String),
    #[error("publisher placed {expected} under {vendor}/{chipid}")]
    Mismatch {
        expected: String,
        vendor: String,
        chipid: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("{0}")]
    Tool(#[from] ToolError),
}

/// One upload on its way through placement.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Owner implied by the directory the file was found in.
    pub assumed_user: Option<String>,
    /// Owner after parsing the name.
    pub user: Option<String>,
    pub status: EntryStatus,
    pub source: PathBuf,
    /// Display name for logs in place of the source file name.
    pub force_name: Option<String>,
    pub wiki_url: Option<String>,
    pub map_url: Option<String>,
    /// Why the entry ended in `Error`.
    pub error: Option<String>,
}

impl Entry {
    pub fn new(source: &Path, assumed_user: Option<&str>) -> Self {
        Self {
            assumed_user: assumed_user.map(str::to_string),
            user: None,
            status: EntryStatus::Pending,
            source: source.to_path_buf(),
            force_name: None,
            wiki_url: None,
            map_url: None,
            error: None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.force_name {
            Some(name) => name.clone(),
            None => self
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.source.display().to_string()),
        }
    }
}

/// Where a parsed upload will land.
#[derive(Debug, Clone)]
pub struct Destination {
    pub name: UploadName,
    pub chip_dir: PathBuf,
    pub single_path: PathBuf,
    pub map_path: PathBuf,
}

impl Destination {
    pub fn new(map_root: &Path, name: UploadName) -> Self {
        let chip_dir = map_root.join(&name.vendor).join(&name.chipid);
        let single_path = chip_dir.join(SINGLE_DIR).join(name.single_basename());
        let map_path = chip_dir.join(name.map_dir_name());
        Self {
            name,
            chip_dir,
            single_path,
            map_path,
        }
    }

    /// The first destination path that is already taken, if any. Symlinks
    /// count as taken even when dangling.
    pub fn collision(&self) -> Option<&Path> {
        [&self.single_path, &self.map_path]
            .into_iter()
            .find(|p| fs::symlink_metadata(p).is_ok())
            .map(PathBuf::as_path)
    }

    /// Copy the upload to the staged path. Fails with `AlreadyExists`
    /// rather than replacing anything found there.
    fn stage(&self, source: &Path) -> io::Result<()> {
        if let Some(single_dir) = self.single_path.parent() {
            fs::create_dir_all(single_dir)?;
        }
        let mut staged = File::create_new(&self.single_path)?;
        io::copy(&mut File::open(source)?, &mut staged)?;
        staged.sync_all()
    }

    /// Manifest key of the staged copy.
    fn single_key(&self) -> String {
        format!("{SINGLE_DIR}/{}", self.name.single_basename())
    }

    /// Remove whatever this placement created at the destination.
    fn cleanup(&self) {
        if self.single_path.exists() {
            warn!(path = %self.single_path.display(), "deleting staged image after failure");
            if let Err(e) = fs::remove_file(&self.single_path) {
                warn!(path = %self.single_path.display(), error = %e, "cleanup failed");
            }
        }
        if self.map_path.exists() {
            warn!(path = %self.map_path.display(), "deleting map directory after failure");
            if let Err(e) = fs::remove_dir_all(&self.map_path) {
                warn!(path = %self.map_path.display(), error = %e, "cleanup failed");
            }
        }
    }
}

/// Drives entries through placement against one configuration and toolchain.
pub struct Placement<'a> {
    config: &'a IngestConfig,
    tools: &'a dyn Toolchain,
}

impl<'a> Placement<'a> {
    pub fn new(config: &'a IngestConfig, tools: &'a dyn Toolchain) -> Self {
        Self { config, tools }
    }

    /// Run `entry` to a terminal status and return it.
    ///
    /// Never fails: every error is folded into the entry's status and
    /// `error` field.
    pub fn process(&self, entry: &mut Entry) -> EntryStatus {
        info!(file = %entry.display_name(), user = ?entry.assumed_user, "processing upload");

        let destination = match self.resolve(entry) {
            Ok(d) => d,
            Err(e) => return fail(entry, e),
        };

        if let Some(existing) = destination.collision() {
            return collide(entry, &destination, existing);
        }

        debug!(from = %entry.source.display(), to = %destination.single_path.display(), "staging");
        match destination.stage(&entry.source) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return collide(entry, &destination, &destination.single_path);
            }
            Err(e) => {
                destination.cleanup();
                return fail(entry, e.into());
            }
        }

        match self.place(entry, &destination) {
            Ok(()) => {
                entry.status = EntryStatus::Done;
                info!(
                    file = %entry.display_name(),
                    wiki = entry.wiki_url.as_deref().unwrap_or(""),
                    "placed"
                );
                entry.status
            }
            Err(e) => {
                destination.cleanup();
                fail(entry, e)
            }
        }
    }

    /// Parse the name and work out the destination.
    fn resolve(&self, entry: &mut Entry) -> Result<Destination, PipelineError> {
        let name = naming::parse_upload_name(&entry.source, entry.assumed_user.as_deref())?;
        entry.user = Some(name.user.clone());
        if !naming::validate_username(&name.user) {
            return Err(PipelineError::InvalidUser(name.user));
        }
        Ok(Destination::new(&self.config.map_dir, name))
    }

    /// Stages after the upload was copied into place. Any error here
    /// triggers cleanup.
    fn place(&self, entry: &mut Entry, dest: &Destination) -> Result<(), PipelineError> {
        let name = &dest.name;
        let user = name.user.as_str();

        manifest::merge(
            &dest.chip_dir,
            &dest.single_key(),
            ManifestEntry::new(user, ArtifactKind::Image),
        )?;

        self.tools.sanity_check(&dest.single_path)?;
        debug!(file = %dest.single_path.display(), "sanity check ok");

        let files = [dest.single_path.clone()];
        let copyright = self
            .config
            .copyright_line(user, chrono::Local::now().year());
        self.tools.convert(&ConvertRequest {
            user,
            files: &files,
            copyright: &copyright,
        })?;

        let publish_started = SystemTime::now();
        let publication = self.tools.publish(&PublishRequest {
            files: &files,
            collection: user,
        })?;
        debug!(
            page = %publication.wiki_page,
            wrote = publication.wrote,
            existed = publication.existed,
            "published"
        );
        entry.wiki_url = Some(publication.wiki_url.clone());
        entry.map_url = Some(publication.map_url.clone());

        let (vendor, chipid) = naming::parse_map_url(&publication.map_url)?;
        if vendor != name.vendor || chipid != name.chipid {
            self.remove_stray_map_dir(&vendor, &chipid, name, publish_started);
            return Err(PipelineError::Mismatch {
                expected: format!("{}/{}", name.vendor, name.chipid),
                vendor,
                chipid,
            });
        }

        append_user_log(&self.config.user_page(user), &publication.wiki_url)?;
        manifest::merge(
            &dest.chip_dir,
            &name.map_dir_name(),
            ManifestEntry::new(user, ArtifactKind::Map),
        )?;

        match scan::retire_upload(&entry.source, self.config.archive_done)? {
            Some(to) => debug!(to = %to.display(), "archived upload"),
            None => debug!(file = %entry.source.display(), "deleted upload"),
        }
        Ok(())
    }

    /// Remove the map directory a publisher wrote under the wrong chip, as
    /// long as it was written during this placement. An older directory there
    /// belongs to an earlier upload and is left alone.
    fn remove_stray_map_dir(
        &self,
        vendor: &str,
        chipid: &str,
        name: &UploadName,
        since: SystemTime,
    ) {
        if !is_plain_segment(vendor) || !is_plain_segment(chipid) {
            warn!(vendor, chipid, "publisher reported an unusable map location");
            return;
        }
        let stray = self
            .config
            .map_dir
            .join(vendor)
            .join(chipid)
            .join(name.map_dir_name());
        let Ok(meta) = fs::symlink_metadata(&stray) else {
            return;
        };
        let fresh = meta.is_dir() && meta.modified().is_ok_and(|t| t + MTIME_SLACK >= since);
        if !fresh {
            warn!(
                path = %stray.display(),
                "map directory under the reported chip predates this upload, leaving it"
            );
            return;
        }
        warn!(path = %stray.display(), "deleting map directory published under the wrong chip");
        if let Err(e) = fs::remove_dir_all(&stray) {
            warn!(path = %stray.display(), error = %e, "cleanup failed");
        }
    }
}

/// A single normal path component, so joining it cannot leave the map tree.
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn collide(entry: &mut Entry, destination: &Destination, existing: &Path) -> EntryStatus {
    warn!(
        file = %entry.display_name(),
        existing = %existing.display(),
        "collision, leaving upload in place"
    );
    if existing == destination.single_path {
        log_duplicate(&entry.source, existing);
    }
    entry.status = EntryStatus::Collision;
    entry.status
}

fn fail(entry: &mut Entry, error: PipelineError) -> EntryStatus {
    warn!(file = %entry.display_name(), error = %error, "placement failed");
    entry.error = Some(error.to_string());
    entry.status = EntryStatus::Error;
    entry.status
}

/// Note whether a collision is a byte-identical re-upload.
fn log_duplicate(upload: &Path, existing: &Path) {
    match (hash_file(upload), hash_file(existing)) {
        (Ok(a), Ok(b)) if a == b => info!(file = %upload.display(), "identical to published image"),
        (Ok(_), Ok(_)) => info!(file = %upload.display(), "differs from published image"),
        _ => {}
    }
}

/// SHA-256 of a file's contents, hex encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Append a wiki link to a user's log page, creating the page if needed.
pub fn append_user_log(page: &Path, wiki_url: &str) -> io::Result<()> {
    if let Some(parent) = page.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(page)?;
    write!(file, "\n[[{wiki_url}]]\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::toolchain::tests::{MockToolchain, RecordedOp};

    fn run(roots: &Roots, tools: &MockToolchain, source: &Path, user: Option<&str>) -> Entry {
        let mut entry = Entry::new(source, user);
        Placement::new(&roots.config, tools).process(&mut entry);
        entry
    }

    #[test]
    fn end_to_end_hyphen_name_in_user_dir() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        let upload = write_upload(&roots.user_dir("alice"), "intel-8086-alice-top.jpg");

        let entry = run(&roots, &tools, &upload, Some("alice"));

        assert_eq!(entry.status, EntryStatus::Done, "{:?}", entry.error);
        assert_eq!(entry.user.as_deref(), Some("alice"));
        let chip = roots.chip_dir("intel", "8086");
        assert!(chip.join("single/intel_8086_alice_top.jpg").is_file());
        assert!(chip.join("alice_top").is_dir());
        assert!(!upload.exists());

        let manifest = read_manifest(&chip);
        let image = &manifest.files["single/intel_8086_alice_top.jpg"];
        assert_eq!(image.collection, "alice");
        assert_eq!(image.kind, ArtifactKind::Image);
        assert_eq!(manifest.files["alice_top"].kind, ArtifactKind::Map);

        let log = fs::read_to_string(roots.config.user_page("alice")).unwrap();
        assert_eq!(
            log,
            "\n[[https://wiki.test/doku.php?id=alice:intel:8086]]\n"
        );
        assert_eq!(
            entry.map_url.as_deref(),
            Some("https://maps.test/map/intel/8086/alice_top/")
        );
    }

    #[test]
    fn tools_called_in_order_with_copyright() {
        let mut roots = setup_roots();
        roots
            .config
            .copyright
            .insert("alice".into(), "Alice Example".into());
        let tools = MockToolchain::new(&roots.config.map_dir);
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        run(&roots, &tools, &upload, None);

        let ops = tools.get_operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], RecordedOp::Sanity(p) if p.ends_with("single/intel_8086_alice_top.jpg")));
        match &ops[1] {
            RecordedOp::Convert { user, copyright, .. } => {
                assert_eq!(user, "alice");
                let year = chrono::Local::now().year();
                assert_eq!(copyright, &format!("&copy; {year} Alice Example"));
            }
            other => panic!("expected convert, got {other:?}"),
        }
        assert!(matches!(&ops[2], RecordedOp::Publish { collection, .. } if collection == "alice"));
    }

    #[test]
    fn second_placement_collides_and_leaves_first_alone() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        let first = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");
        assert_eq!(run(&roots, &tools, &first, None).status, EntryStatus::Done);

        let chip = roots.chip_dir("intel", "8086");
        let staged = chip.join("single/intel_8086_alice_top.jpg");
        let staged_before = fs::read(&staged).unwrap();
        let manifest_before = fs::read(manifest::manifest_path(&chip)).unwrap();
        let calls_before = tools.get_operations().len();

        let alice_dir = roots.user_dir("alice");
        fs::write(alice_dir.join("intel_8086_top.jpg"), "different bytes").unwrap();
        let second = alice_dir.join("intel_8086_top.jpg");
        let entry = run(&roots, &tools, &second, Some("alice"));

        assert_eq!(entry.status, EntryStatus::Collision);
        assert!(second.exists());
        assert_eq!(fs::read(&staged).unwrap(), staged_before);
        assert!(chip.join("alice_top").is_dir());
        assert_eq!(fs::read(manifest::manifest_path(&chip)).unwrap(), manifest_before);
        assert_eq!(tools.get_operations().len(), calls_before);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_at_staged_path_is_collision() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        let chip = roots.chip_dir("intel", "8086");
        fs::create_dir_all(chip.join("single")).unwrap();
        let target = roots.tmp.path().join("elsewhere.jpg");
        let staged = chip.join("single/intel_8086_alice_top.jpg");
        std::os::unix::fs::symlink(&target, &staged).unwrap();
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        let entry = run(&roots, &tools, &upload, None);

        assert_eq!(entry.status, EntryStatus::Collision);
        assert!(fs::symlink_metadata(&staged).unwrap().file_type().is_symlink());
        assert!(!target.exists());
        assert!(upload.exists());
        assert!(tools.get_operations().is_empty());
    }

    #[test]
    fn staging_never_replaces_an_existing_file() {
        let roots = setup_roots();
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");
        let name = naming::parse_upload_name(&upload, None).unwrap();
        let dest = Destination::new(&roots.config.map_dir, name);
        fs::create_dir_all(dest.single_path.parent().unwrap()).unwrap();
        fs::write(&dest.single_path, "already here").unwrap();

        let err = dest.stage(&upload).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&dest.single_path).unwrap(), "already here");
    }

    #[test]
    fn leftover_staged_file_from_crash_is_collision() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        let chip = roots.chip_dir("intel", "8086");
        fs::create_dir_all(chip.join("single")).unwrap();
        fs::write(chip.join("single/intel_8086_alice_top.jpg"), "half done").unwrap();
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        let entry = run(&roots, &tools, &upload, None);

        assert_eq!(entry.status, EntryStatus::Collision);
        assert!(upload.exists());
        assert_eq!(
            fs::read_to_string(chip.join("single/intel_8086_alice_top.jpg")).unwrap(),
            "half done"
        );
        assert!(tools.get_operations().is_empty());
    }

    #[test]
    fn existing_map_dir_is_collision() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        fs::create_dir_all(roots.chip_dir("intel", "8086").join("alice_top")).unwrap();
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.png");

        assert_eq!(run(&roots, &tools, &upload, None).status, EntryStatus::Collision);
        assert!(roots.chip_dir("intel", "8086").join("alice_top").is_dir());
    }

    #[test]
    fn bad_name_is_error_without_side_effects() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        let upload = write_upload(&roots.config.upload_dir, "Intel_8086_alice_top.jpg");

        let entry = run(&roots, &tools, &upload, None);

        assert_eq!(entry.status, EntryStatus::Error);
        assert!(entry.error.is_some());
        assert!(upload.exists());
        assert!(fs::read_dir(&roots.config.map_dir).unwrap().next().is_none());
    }

    #[test]
    fn legacy_name_without_directory_user_is_error() {
        let roots = setup_roots();
        let tools = MockToolchain::new(&roots.config.map_dir);
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_top.jpg");
        assert_eq!(run(&roots, &tools, &upload, None).status, EntryStatus::Error);
    }

    fn assert_cleaned(roots: &Roots, upload: &Path) {
        let chip = roots.chip_dir("intel", "8086");
        assert!(!chip.join("single/intel_8086_alice_top.jpg").exists());
        assert!(!chip.join("alice_top").exists());
        assert!(upload.exists(), "upload must stay for inspection");
    }

    #[test]
    fn sanity_failure_cleans_up() {
        let roots = setup_roots();
        let tools = MockToolchain {
            fail_sanity: true,
            ..MockToolchain::new(&roots.config.map_dir)
        };
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        let entry = run(&roots, &tools, &upload, None);

        assert_eq!(entry.status, EntryStatus::Error);
        assert_cleaned(&roots, &upload);
        assert_eq!(tools.count(|op| matches!(op, RecordedOp::Convert { .. })), 0);
    }

    #[test]
    fn convert_failure_cleans_up() {
        let roots = setup_roots();
        let tools = MockToolchain {
            fail_convert: true,
            ..MockToolchain::new(&roots.config.map_dir)
        };
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        assert_eq!(run(&roots, &tools, &upload, None).status, EntryStatus::Error);
        assert_cleaned(&roots, &upload);
        assert_eq!(tools.count(|op| matches!(op, RecordedOp::Publish { .. })), 0);
    }

    #[test]
    fn publish_failure_removes_map_dir() {
        let roots = setup_roots();
        let tools = MockToolchain {
            fail_publish: true,
            ..MockToolchain::new(&roots.config.map_dir)
        };
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        assert_eq!(run(&roots, &tools, &upload, None).status, EntryStatus::Error);
        assert_cleaned(&roots, &upload);
        assert!(!roots.config.user_page("alice").exists());
    }

    #[test]
    fn mismatched_map_url_is_error() {
        let roots = setup_roots();
        let tools = MockToolchain {
            publish_vendor: Some("amd".into()),
            ..MockToolchain::new(&roots.config.map_dir)
        };
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        let entry = run(&roots, &tools, &upload, None);

        assert_eq!(entry.status, EntryStatus::Error);
        assert!(entry.error.as_deref().unwrap().contains("amd/8086"));
        assert_cleaned(&roots, &upload);
        assert!(!roots.chip_dir("amd", "8086").join("alice_top").exists());
    }

    #[cfg(unix)]
    #[test]
    fn mismatch_keeps_older_map_dir_under_reported_chip() {
        let roots = setup_roots();
        let tools = MockToolchain {
            publish_vendor: Some("amd".into()),
            ..MockToolchain::new(&roots.config.map_dir)
        };
        let earlier = roots.chip_dir("amd", "8086").join("alice_top");
        fs::create_dir_all(&earlier).unwrap();
        fs::write(earlier.join("tile.png"), "earlier map").unwrap();
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        File::open(&earlier).unwrap().set_modified(an_hour_ago).unwrap();
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        let entry = run(&roots, &tools, &upload, None);

        assert_eq!(entry.status, EntryStatus::Error);
        assert_cleaned(&roots, &upload);
        assert_eq!(
            fs::read_to_string(earlier.join("tile.png")).unwrap(),
            "earlier map"
        );
    }

    #[test]
    fn segments_that_escape_the_map_tree_are_not_plain() {
        assert!(is_plain_segment("amd"));
        assert!(!is_plain_segment(".."));
        assert!(!is_plain_segment("."));
        assert!(!is_plain_segment("/etc"));
        assert!(!is_plain_segment(""));
    }

    #[test]
    fn archive_done_moves_source() {
        let mut roots = setup_roots();
        roots.config.archive_done = true;
        let tools = MockToolchain::new(&roots.config.map_dir);
        let upload = write_upload(&roots.config.upload_dir, "intel_8086_alice_top.jpg");

        assert_eq!(run(&roots, &tools, &upload, None).status, EntryStatus::Done);
        assert!(!upload.exists());
        assert!(roots.config.upload_dir.join("done/intel_8086_alice_top.jpg").is_file());
    }

    #[test]
    fn user_log_accumulates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let page = tmp.path().join("users/alice.txt");
        append_user_log(&page, "https://w/a").unwrap();
        append_user_log(&page, "https://w/b").unwrap();
        assert_eq!(
            fs::read_to_string(&page).unwrap(),
            "\n[[https://w/a]]\n\n[[https://w/b]]\n"
        );
    }

    #[test]
    fn hash_file_tracks_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        fs::write(&b, "other").unwrap();
        assert_ne!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
        assert_eq!(hash_file(&a).unwrap().len(), 64);
    }

    #[test]
    fn force_name_overrides_display() {
        let mut entry = Entry::new(Path::new("/u/intel_8086_alice_top.jpg"), None);
        assert_eq!(entry.display_name(), "intel_8086_alice_top.jpg");
        entry.force_name = Some("Die shot".into());
        assert_eq!(entry.display_name(), "Die shot");
    }
}
