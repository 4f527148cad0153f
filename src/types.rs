use std::fmt;
use std::path::{Path, PathBuf};

/// Represents a Python file selected for annotation.
///
/// It stores the path intended for display to the user and the canonicalized,
/// absolute path used for duplicate checking, reading and writing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedFile {
    // Path to show to the user (e.g., relative to PWD).
    pub(crate) display_path: PathBuf,
    // Absolute, canonicalized path for uniqueness checks and file I/O.
    pub(crate) canonical_path: PathBuf,
}

impl ResolvedFile {
    /// Used by `file_resolver.rs` after successful canonicalization and path diffing.
    pub(crate) fn new(display_path: PathBuf, canonical_path: PathBuf) -> Self {
        Self {
            display_path,
            canonical_path,
        }
    }

    /// Returns the path suitable for display to the user.
    pub fn display_path(&self) -> &Path {
        &self.display_path
    }

    /// Returns the canonical, absolute path to the file.
    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }
}

/// Represents the outcome of resolving a single `-f` input string.
/// It is generic over a lifetime `'a` to borrow the input string, avoiding allocations.
#[derive(Debug, Clone)]
pub enum InputResolution<'a> {
    /// Resolved to one or more files (a literal path or the matches of a glob).
    Success(Vec<ResolvedFile>),

    /// A valid glob pattern that matched no file.
    NotFound { input_string: &'a str },

    /// The input was treated as an explicit path, but it does not exist on the filesystem.
    PathDoesNotExist {
        input_string: &'a str,
        /// The absolute or relative path that was checked.
        path_tried: PathBuf,
    },

    /// The input looked like a glob pattern but could not be compiled.
    InvalidGlobPattern { input_string: &'a str, error: String },
}

/// One function declaration and its body, copied verbatim out of a source text.
///
/// `text` is the exact run of lines `start_line..end_line()` of the source joined
/// with `'\n'`, so a span can always be spliced back by line index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    pub text: String,
    /// 0-based index of the `def` line in the source.
    pub start_line: usize,
    /// Indentation units (4 columns each) of the `def` line.
    pub base_indent: usize,
    /// Lines making up the declaration header, the `def` line included.
    pub header_line_count: usize,
}

impl FunctionSpan {
    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Exclusive end line index in the source.
    pub fn end_line(&self) -> usize {
        self.start_line + self.line_count()
    }
}

/// What the synthesizer produced for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocstringRecord {
    pub function_name: String,
    pub full_docstring: String,
    pub short_summary: String,
}

/// Ordered `name: summary` lines accumulated during one annotation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeLog {
    entries: Vec<String>,
}

impl ResumeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, function_name: &str, summary: &str) {
        self.entries.push(format!("{}: {}", function_name, summary));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ResumeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join("\n"))
    }
}

/// Where the parser gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxErrorLocus {
    /// 1-based line number.
    pub line: usize,
    /// 0-based column offset within the line.
    pub column: usize,
    pub message: String,
}

impl fmt::Display for SyntaxErrorLocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: SyntaxError: {}", self.line, self.column, self.message)
    }
}

/// A single line neutralized by the repair loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairEvent {
    pub locus: SyntaxErrorLocus,
    /// 1-based number of the line that was commented out. Usually `locus.line`.
    pub commented_line: usize,
    pub original_text: String,
}
