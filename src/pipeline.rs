//! End-to-end annotation of texts, files and the watch folders.
//!
//! One text goes through: reformat, docstrings, reformat, repair, file summary,
//! repair. The second repair guarantees the written text parses even when the
//! generated summary does not.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::AppError;
use crate::file_resolver::{WatchFolders, is_python_file};
use crate::indent::{dedent, leading_indentation, prefix_lines};
use crate::repair::repair;
use crate::session::Session;
use crate::summarizer::{prepend_comment, summarize};
use crate::synthesizer::annotate;
use crate::types::{DocstringRecord, RepairEvent, ResumeLog};

const BACKUP_PREFIX: &str = "_";
const FAILED_SUFFIX: &str = ".failed";

/// Result of annotating one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentedSource {
    pub text: String,
    pub resume: ResumeLog,
    pub records: Vec<DocstringRecord>,
    pub repairs: Vec<RepairEvent>,
    pub file_summary: Option<String>,
}

/// Annotates a whole Python text.
pub fn comment_source(session: &Session<'_>, source: &str) -> Result<CommentedSource, AppError> {
    let formatted = session.reformat(source);
    let annotated = annotate(session, &formatted)?;
    let reformatted = session.reformat(&annotated.text);
    let first = repair(&reformatted)?;
    let mut repairs = first.events;

    let mut file_summary = None;
    let mut text = first.text;
    if session.options.file_summary {
        if let Some(comment) = summarize(session, &text, &annotated.resume)? {
            let second = repair(&prepend_comment(&text, &comment))?;
            repairs.extend(second.events);
            text = second.text;
            file_summary = Some(comment);
        }
    }

    Ok(CommentedSource {
        text,
        resume: annotated.resume,
        records: annotated.records,
        repairs,
        file_summary,
    })
}

/// Annotates a fragment such as a method copied out of its class.
///
/// The fragment is moved to column 0 for the work and put back at its
/// original indentation. No file summary is added.
pub fn comment_snippet(session: &Session<'_>, code: &str) -> Result<CommentedSource, AppError> {
    let indentation = leading_indentation(code).to_string();
    let annotated = annotate(session, &dedent(code))?;
    let repaired = repair(&session.reformat(&annotated.text))?;
    Ok(CommentedSource {
        text: prefix_lines(&repaired.text, &indentation),
        resume: annotated.resume,
        records: annotated.records,
        repairs: repaired.events,
        file_summary: None,
    })
}

fn read_source(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path)
        .map_err(|e| AppError::IoError(format!("Failed to read {:?}: {}", path, e)))
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::IoError(format!("Failed to create {:?}: {}", parent, e)))?;
    }
    fs::write(path, text).map_err(|e| AppError::IoError(format!("Failed to write {:?}: {}", path, e)))
}

fn copy_file(from: &Path, to: &Path) -> Result<(), AppError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::IoError(format!("Failed to create {:?}: {}", parent, e)))?;
    }
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| AppError::IoError(format!("Failed to copy {:?} to {:?}: {}", from, to, e)))
}

/// `dir/name.py` -> `dir/_name.py`
pub fn backup_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", BACKUP_PREFIX, name))
}

fn failed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(FAILED_SUFFIX);
    PathBuf::from(name)
}

/// Appends one `filename:line:column: SyntaxError: message` line per event.
pub fn append_error_log(log: &Path, filename: &str, events: &[RepairEvent]) -> Result<(), AppError> {
    if events.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .map_err(|e| AppError::IoError(format!("Failed to open error log {:?}: {}", log, e)))?;
    for event in events {
        writeln!(file, "{}:{}", filename, event.locus)
            .map_err(|e| AppError::IoError(format!("Failed to write error log {:?}: {}", log, e)))?;
    }
    Ok(())
}

/// Annotates `path` in place, keeping the original as `_<name>` beside it.
///
/// Nothing is written when annotation fails.
pub fn comment_file_in_place(
    session: &Session<'_>,
    path: &Path,
    label: &str,
    error_log: &Path,
) -> Result<CommentedSource, AppError> {
    let source = read_source(path)?;
    let commented = comment_source(session, &source)?;
    copy_file(path, &backup_path(path))?;
    write_text(path, &commented.text)?;
    append_error_log(error_log, label, &commented.repairs)?;
    info!(file = label, functions = commented.records.len(), "file annotated");
    Ok(commented)
}

/// Annotates `input` into `output`.
pub fn comment_file_to(
    session: &Session<'_>,
    input: &Path,
    output: &Path,
    label: &str,
    error_log: &Path,
) -> Result<CommentedSource, AppError> {
    let source = read_source(input)?;
    let commented = comment_source(session, &source)?;
    write_text(output, &commented.text)?;
    append_error_log(error_log, label, &commented.repairs)?;
    info!(file = label, functions = commented.records.len(), "file annotated");
    Ok(commented)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepStatus {
    Annotated { functions: usize, repairs: usize },
    /// Not a Python file, copied verbatim.
    Copied,
    /// Annotation failed; the input went to `<modified>.failed`.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepEntry {
    pub relative: PathBuf,
    pub status: SweepStatus,
}

/// Processes every file currently in the drop folder, once.
///
/// Per-file failures are reported in the returned entries; credential and
/// I/O failures stop the sweep.
pub fn sweep(
    session: &Session<'_>,
    folders: &WatchFolders,
    error_log: &Path,
) -> Result<Vec<SweepEntry>, AppError> {
    let mut entries = Vec::new();
    for relative in folders.pending_files() {
        let dropped = folders.drop.join(&relative);
        let modified = folders.modified.join(&relative);
        let label = relative.to_string_lossy().into_owned();
        debug!(file = %label, "picked up");

        copy_file(&dropped, &folders.originals.join(&relative))?;

        let status = if is_python_file(&relative) {
            match comment_file_to(session, &dropped, &modified, &label, error_log) {
                Ok(commented) => SweepStatus::Annotated {
                    functions: commented.records.len(),
                    repairs: commented.repairs.len(),
                },
                Err(e) if e.is_per_file() => {
                    error!(file = %label, error = %e, "annotation failed");
                    copy_file(&dropped, &failed_path(&modified))?;
                    SweepStatus::Failed {
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            }
        } else {
            copy_file(&dropped, &modified)?;
            SweepStatus::Copied
        };

        fs::remove_file(&dropped)
            .map_err(|e| AppError::IoError(format!("Failed to remove {:?}: {}", dropped, e)))?;
        entries.push(SweepEntry { relative, status });
    }
    folders.prune_empty_dirs()?;
    Ok(entries)
}
