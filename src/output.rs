//! CLI output formatting.
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! ok   intel-8086-alice-top.jpg
//!     single: intel/8086/single/intel_8086_alice_top.jpg
//!     map: intel/8086/alice_top/
//! bad  Holiday.JPG
//!     uppercase characters are not allowed
//! ```
//!
//! ## Iteration summary
//!
//! ```text
//! Archives
//!     batch.tar: extracted 2 files
//!     mixed.tar: rejected
//!         Holiday.JPG: uppercase characters are not allowed
//!
//! Uploads
//!     Done       intel_8086_alice_top.jpg
//!         https://wiki.example/doku.php?id=alice:intel:8086
//!     Collision  intel_8086_top.jpg (alice)
//!     Error      mos_6502_bob_x.jpg
//!         identify exited with Some(1): not an image
//!
//! Invalid user directories
//!     Bad.User
//!
//! 1 done, 1 collision, 1 error, reindexed
//! ```

use crate::archive::ArchiveOutcome;
use crate::naming::{ParseError, UploadName};
use crate::scheduler::IterationReport;
use crate::types::EntryStatus;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format name-check results, one block per checked name.
pub fn format_check_results(results: &[(String, Result<UploadName, ParseError>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (input, result) in results {
        match result {
            Ok(name) => {
                lines.push(format!("ok   {input}"));
                lines.push(format!(
                    "{}single: {}/{}/single/{}",
                    indent(1),
                    name.vendor,
                    name.chipid,
                    name.single_basename()
                ));
                lines.push(format!(
                    "{}map: {}/{}/{}/",
                    indent(1),
                    name.vendor,
                    name.chipid,
                    name.map_dir_name()
                ));
            }
            Err(e) => {
                lines.push(format!("bad  {input}"));
                lines.push(format!("{}{e}", indent(1)));
            }
        }
    }
    lines
}

pub fn print_check_results(results: &[(String, Result<UploadName, ParseError>)]) {
    for line in format_check_results(results) {
        println!("{}", line);
    }
}

// ============================================================================
// Iteration summary
// ============================================================================

fn archive_lines(outcome: &ArchiveOutcome) -> Vec<String> {
    let name = file_name(outcome.archive());
    match outcome {
        ArchiveOutcome::Extracted { files, .. } => {
            vec![format!("{}{name}: extracted {}", indent(1), plural(files.len(), "file"))]
        }
        ArchiveOutcome::Rejected { problems, .. } => {
            let mut lines = vec![format!("{}{name}: rejected", indent(1))];
            lines.extend(problems.iter().map(|p| format!("{}{p}", indent(2))));
            lines
        }
        ArchiveOutcome::Failed { error, .. } => {
            vec![
                format!("{}{name}: failed", indent(1)),
                format!("{}{error}", indent(2)),
            ]
        }
    }
}

/// Format what one scheduler iteration did.
pub fn format_iteration_report(report: &IterationReport) -> Vec<String> {
    if report.is_idle() {
        return vec!["Nothing to do".to_string()];
    }

    let mut lines = Vec::new();

    if !report.archives.is_empty() {
        lines.push("Archives".to_string());
        for outcome in &report.archives {
            lines.extend(archive_lines(outcome));
        }
        lines.push(String::new());
    }

    if !report.entries.is_empty() {
        lines.push("Uploads".to_string());
        for entry in &report.entries {
            let owner = match &entry.assumed_user {
                Some(user) => format!(" ({user})"),
                None => String::new(),
            };
            lines.push(format!(
                "{}{:<10} {}{owner}",
                indent(1),
                entry.status.to_string(),
                entry.display_name()
            ));
            match entry.status {
                EntryStatus::Done => {
                    if let Some(url) = &entry.wiki_url {
                        lines.push(format!("{}{url}", indent(2)));
                    }
                }
                EntryStatus::Error => {
                    if let Some(err) = &entry.error {
                        lines.push(format!("{}{err}", indent(2)));
                    }
                }
                EntryStatus::Collision | EntryStatus::Pending => {}
            }
        }
        lines.push(String::new());
    }

    if !report.invalid_users.is_empty() {
        lines.push("Invalid user directories".to_string());
        for user in &report.invalid_users {
            lines.push(format!("{}{user}", indent(1)));
        }
        lines.push(String::new());
    }

    let mut summary = format!(
        "{} done, {}, {}",
        report.count(EntryStatus::Done),
        plural(report.count(EntryStatus::Collision), "collision"),
        plural(report.count(EntryStatus::Error), "error")
    );
    if report.reindexed {
        summary.push_str(", reindexed");
    }
    lines.push(summary);
    lines
}

pub fn print_iteration_report(report: &IterationReport) {
    for line in format_iteration_report(report) {
        println!("{}", line);
    }
}
