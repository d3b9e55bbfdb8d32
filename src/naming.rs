//! Filename grammar for uploaded die images.
//!
//! Every upload names its own destination. The canonical form carries four
//! fields and an extension:
//!
//! ```text
//! vendor_chipid_user_flavor.ext     intel_80c186-a_alice_mz-mit20x.jpg
//! vendor-chipid-user-flavor.ext     intel-8086-alice-top.jpg
//! ```
//!
//! Fields use the class `[a-z0-9-]` and are separated by `_`. A name without
//! any `_` may use `-` as the separator instead, in which case the fields
//! themselves cannot contain hyphens. Uploads that predate the user field
//! (`vendor_chipid_flavor.ext`) are accepted inside a user's own directory,
//! where the directory name supplies the user.
//!
//! ## Case
//!
//! Uppercase is rejected outright rather than folded: two uploads that only
//! differ in case would otherwise land on the same destination.
//!
//! ## Destinations
//!
//! A parsed name maps to two destinations under `<map>/<vendor>/<chipid>/`:
//! the flat `single/vendor_chipid_user_flavor.ext` artifact and the published
//! map directory `user_flavor`.

use std::path::Path;
use thiserror::Error;

/// Directory name reserved for archived uploads; never a user.
pub const RESERVED_DONE: &str = "done";

const MAX_USER_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("uppercase characters are not allowed: {0}")]
    Uppercase(String),
    #[error("missing file extension: {0}")]
    MissingExtension(String),
    #[error("bad extension in {0}")]
    BadExtension(String),
    #[error("expected vendor, chipid, user and flavor fields: {0}")]
    FieldCount(String),
    #[error("empty or malformed field '{field}' in {name}")]
    BadField { field: &'static str, name: String },
    #[error("user '{named}' in file name does not match directory user '{assumed}'")]
    UserMismatch { named: String, assumed: String },
    #[error("legacy name without user requires a user directory: {0}")]
    NoUser(String),
    #[error("invalid user name: {0}")]
    InvalidUser(String),
    #[error("not a map URL: {0}")]
    NotMapUrl(String),
}

/// Components of a valid upload name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    pub vendor: String,
    pub chipid: String,
    pub user: String,
    pub flavor: String,
    pub ext: String,
}

impl UploadName {
    /// Basename of the flat artifact in the chip's `single/` directory.
    pub fn single_basename(&self) -> String {
        single_basename(&self.vendor, &self.chipid, &self.user, &self.flavor, &self.ext)
    }

    /// Name of the published map directory next to `single/`.
    pub fn map_dir_name(&self) -> String {
        map_dir_name(&self.user, &self.flavor)
    }
}

/// Build `vendor_chipid_user_flavor.ext`.
pub fn single_basename(vendor: &str, chipid: &str, user: &str, flavor: &str, ext: &str) -> String {
    format!("{vendor}_{chipid}_{user}_{flavor}.{ext}")
}

/// Build `user_flavor`.
pub fn map_dir_name(user: &str, flavor: &str) -> String {
    format!("{user}_{flavor}")
}

/// Parse an upload name, taking only the final path component into account.
///
/// `assume_user` is the owning user when the file sits in a user directory.
/// It fills in the user for legacy three-field names and must agree with the
/// user field of a four-field name.
pub fn parse_upload_name(path: &Path, assume_user: Option<&str>) -> Result<UploadName, ParseError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    parse_basename(&name, assume_user)
}

/// Parse a bare basename. See [`parse_upload_name`].
pub fn parse_basename(name: &str, assume_user: Option<&str>) -> Result<UploadName, ParseError> {
    if name.chars().any(|c| c.is_uppercase()) {
        return Err(ParseError::Uppercase(name.to_string()));
    }

    let (stem, ext) = name
        .rsplit_once('.')
        .ok_or_else(|| ParseError::MissingExtension(name.to_string()))?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(ParseError::BadExtension(name.to_string()));
    }

    // Hyphens only separate fields when no underscore is present
    let (fields, allow_hyphen): (Vec<&str>, bool) = if stem.contains('_') {
        (stem.split('_').collect(), true)
    } else {
        (stem.split('-').collect(), false)
    };

    let (vendor, chipid, named_user, flavor) = match fields.as_slice() {
        [vendor, chipid, user, flavor] => (*vendor, *chipid, Some(*user), *flavor),
        [vendor, chipid, flavor] => (*vendor, *chipid, None, *flavor),
        _ => return Err(ParseError::FieldCount(name.to_string())),
    };

    for (field, value) in [("vendor", vendor), ("chipid", chipid), ("flavor", flavor)] {
        if !valid_field(value, allow_hyphen) {
            return Err(ParseError::BadField {
                field,
                name: name.to_string(),
            });
        }
    }

    let user = match (named_user, assume_user) {
        (Some(named), Some(assumed)) if named != assumed => {
            return Err(ParseError::UserMismatch {
                named: named.to_string(),
                assumed: assumed.to_string(),
            });
        }
        (Some(named), _) => named,
        (None, Some(assumed)) => assumed,
        (None, None) => return Err(ParseError::NoUser(name.to_string())),
    };
    if !validate_username(user) {
        return Err(ParseError::InvalidUser(user.to_string()));
    }

    Ok(UploadName {
        vendor: vendor.to_string(),
        chipid: chipid.to_string(),
        user: user.to_string(),
        flavor: flavor.to_string(),
        ext: ext.to_string(),
    })
}

/// True if `user` may own an upload directory.
pub fn validate_username(user: &str) -> bool {
    !user.is_empty()
        && user.len() <= MAX_USER_LEN
        && user != RESERVED_DONE
        && !user.starts_with('-')
        && !user.ends_with('-')
        && user
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Extract `(vendor, chipid)` from a published map URL such as
/// `https://example.org/map/intel/8086/alice_top/`.
pub fn parse_map_url(url: &str) -> Result<(String, String), ParseError> {
    let path = url.split('|').next().unwrap_or(url);
    let after = path
        .split_once("/map/")
        .map(|(_, rest)| rest)
        .ok_or_else(|| ParseError::NotMapUrl(url.to_string()))?;
    let mut parts = after.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(vendor), Some(chipid)) => Ok((vendor.to_string(), chipid.to_string())),
        _ => Err(ParseError::NotMapUrl(url.to_string())),
    }
}

fn valid_field(value: &str, allow_hyphen: bool) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || (allow_hyphen && c == '-'))
}
