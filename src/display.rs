use crate::error::AppError;
use crate::file_resolver::WatchFolders;
use crate::pipeline::{CommentedSource, SweepEntry, SweepStatus};
use crate::types::{InputResolution, ResolvedFile};
use console::{Style, Term};
use std::io::{self, Write};

pub struct DisplayManager {
    term: Term,
    // Predefined styles for consistency
    pub error_style: Style,
    pub warning_style: Style,
    pub success_style: Style,
    pub filename_style: Style,
    pub metadata_style: Style,
    pub summary_style: Style,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(), // Use stderr for status messages, stdout for annotated code
            error_style: Style::new().red().bold(),
            warning_style: Style::new().yellow(),
            success_style: Style::new().green(),
            filename_style: Style::new().cyan().bold(),
            metadata_style: Style::new().dim(),
            summary_style: Style::new().white().dim(),
        }
    }

    /// Print resolution errors with proper styling
    pub fn print_resolution_errors(
        &self,
        path_errors: &[&InputResolution],
        not_founds: &[&InputResolution],
        invalid_globs: &[&InputResolution],
        successful_files: &[ResolvedFile],
    ) -> io::Result<()> {
        let mut stderr = self.term.clone();

        writeln!(
            stderr,
            "{}",
            self.error_style
                .apply_to("Could not proceed due to unresolved inputs:")
        )?;
        writeln!(stderr, "{}", self.metadata_style.apply_to("-".repeat(50)))?;

        if !path_errors.is_empty() {
            writeln!(
                stderr,
                "\n{}",
                self.error_style
                    .apply_to("The following specified paths do not exist:")
            )?;
            for case in path_errors {
                if let InputResolution::PathDoesNotExist {
                    input_string,
                    path_tried,
                } = case
                {
                    writeln!(
                        stderr,
                        "  {} {} {}",
                        self.metadata_style.apply_to("•"),
                        self.error_style
                            .apply_to(format!("Input: '{}'", input_string)),
                        self.metadata_style
                            .apply_to(format!("(checked: {:?})", path_tried))
                    )?;
                }
            }
        }

        if !not_founds.is_empty() {
            writeln!(
                stderr,
                "\n{}",
                self.warning_style
                    .apply_to("The following inputs matched no Python file:")
            )?;
            for case in not_founds {
                if let InputResolution::NotFound { input_string } = case {
                    writeln!(
                        stderr,
                        "  {} {}",
                        self.metadata_style.apply_to("•"),
                        self.warning_style
                            .apply_to(format!("Input: '{}'", input_string))
                    )?;
                }
            }
        }

        if !invalid_globs.is_empty() {
            writeln!(
                stderr,
                "\n{}",
                self.error_style.apply_to("The following glob patterns are invalid:")
            )?;
            for case in invalid_globs {
                if let InputResolution::InvalidGlobPattern {
                    input_string,
                    error,
                } = case
                {
                    writeln!(
                        stderr,
                        "  {} {} {}",
                        self.metadata_style.apply_to("•"),
                        self.error_style
                            .apply_to(format!("Input: '{}'", input_string)),
                        self.metadata_style.apply_to(format!("({})", error))
                    )?;
                }
            }
        }

        if !successful_files.is_empty() {
            writeln!(
                stderr,
                "\n{}",
                self.success_style
                    .apply_to("Successfully resolved files (would have been annotated):")
            )?;
            for resolved_file in successful_files {
                writeln!(
                    stderr,
                    "  {} {}",
                    self.metadata_style.apply_to("✓"),
                    self.filename_style
                        .apply_to(format!("{:?}", resolved_file.display_path()))
                )?;
            }
        } else {
            writeln!(
                stderr,
                "\n{}",
                self.error_style
                    .apply_to("No files were successfully resolved.")
            )?;
        }

        writeln!(
            stderr,
            "\n{}",
            self.metadata_style
                .apply_to("Please resolve the issues above and try again.")
        )?;
        Ok(())
    }

    /// What happened to one annotated text: documented functions, repairs, file summary.
    pub fn print_file_result(&self, label: &str, result: &CommentedSource) -> io::Result<()> {
        let mut stderr = self.term.clone();

        writeln!(
            stderr,
            "\n{} {} {}",
            self.success_style.apply_to("✓"),
            self.filename_style.apply_to(label),
            self.metadata_style.apply_to(format!(
                "({} documented, {} repaired)",
                result.records.len(),
                result.repairs.len()
            ))
        )?;

        for entry in result.resume.entries() {
            writeln!(
                stderr,
                "   {} {}",
                self.metadata_style.apply_to("│"),
                self.summary_style.apply_to(entry)
            )?;
        }

        for event in &result.repairs {
            let shown = if event.original_text.len() > 60 {
                let cut = event
                    .original_text
                    .char_indices()
                    .nth(57)
                    .map(|(i, _)| i)
                    .unwrap_or(event.original_text.len());
                format!("{}...", &event.original_text[..cut])
            } else {
                event.original_text.clone()
            };
            writeln!(
                stderr,
                "   {} {} {}",
                self.warning_style
                    .apply_to(format!("line {} commented out:", event.commented_line)),
                self.summary_style.apply_to(shown.trim()),
                self.metadata_style.apply_to(format!("({})", event.locus.message))
            )?;
        }

        if let Some(summary) = &result.file_summary {
            writeln!(stderr, "   {}", self.metadata_style.apply_to("File summary:"))?;
            for line in summary.lines() {
                writeln!(stderr, "   {}", self.summary_style.apply_to(line))?;
            }
        }
        Ok(())
    }

    pub fn print_file_failure(&self, label: &str, err: &AppError) -> io::Result<()> {
        let mut stderr = self.term.clone();
        writeln!(
            stderr,
            "\n{} {} {}",
            self.error_style.apply_to("✗"),
            self.filename_style.apply_to(label),
            self.error_style.apply_to(err.to_string())
        )
    }

    pub fn print_watch_banner(&self, folders: &WatchFolders, once: bool) -> io::Result<()> {
        let mut stderr = self.term.clone();
        let mode = if once { "Processing" } else { "Watching" };
        writeln!(
            stderr,
            "{} {}",
            self.success_style.apply_to(mode),
            self.filename_style.apply_to(folders.drop.display())
        )?;
        writeln!(
            stderr,
            "   {} {}",
            self.metadata_style.apply_to("originals →"),
            self.metadata_style.apply_to(folders.originals.display())
        )?;
        writeln!(
            stderr,
            "   {} {}",
            self.metadata_style.apply_to("annotated →"),
            self.metadata_style.apply_to(folders.modified.display())
        )?;
        Ok(())
    }

    /// One line per file handled during a watch-folder sweep.
    pub fn print_sweep(&self, entries: &[SweepEntry]) -> io::Result<()> {
        let mut stderr = self.term.clone();
        for entry in entries {
            let name = entry.relative.to_string_lossy();
            match &entry.status {
                SweepStatus::Annotated { functions, repairs } => writeln!(
                    stderr,
                    "{} {} {}",
                    self.success_style.apply_to("✓"),
                    self.filename_style.apply_to(&name),
                    self.metadata_style
                        .apply_to(format!("({} documented, {} repaired)", functions, repairs))
                )?,
                SweepStatus::Copied => writeln!(
                    stderr,
                    "{} {} {}",
                    self.metadata_style.apply_to("→"),
                    self.filename_style.apply_to(&name),
                    self.metadata_style.apply_to("(copied as is)")
                )?,
                SweepStatus::Failed { reason } => writeln!(
                    stderr,
                    "{} {} {}",
                    self.error_style.apply_to("✗"),
                    self.filename_style.apply_to(&name),
                    self.error_style.apply_to(reason)
                )?,
            }
        }
        Ok(())
    }

    /// Print clipboard status
    pub fn print_clipboard_status(
        &self,
        success: bool,
        size: usize,
        lines: usize,
        error: Option<&str>,
    ) -> io::Result<()> {
        let mut stderr = self.term.clone();

        if success {
            writeln!(
                stderr,
                "\n{} Annotated code copied to clipboard ({} bytes, {} lines)",
                self.success_style.apply_to("✅"),
                self.metadata_style.apply_to(size.to_string()),
                self.metadata_style.apply_to(lines.to_string())
            )?;
        } else if let Some(err_msg) = error {
            writeln!(
                stderr,
                "\n{} Clipboard unavailable: {}",
                self.warning_style.apply_to("⚠"),
                self.warning_style.apply_to(err_msg)
            )?;
            writeln!(stderr, "   Output printed to stdout instead.")?;
        }
        Ok(())
    }
}
