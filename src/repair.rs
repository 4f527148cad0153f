// src/repair.rs

use tracing::{debug, warn};

use crate::error::AppError;
use crate::syntax_check::find_syntax_error;
use crate::types::RepairEvent;

const COMMENT_MARKER: &str = "#";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    pub text: String,
    pub events: Vec<RepairEvent>,
}

/// Comments out offending lines one at a time until `source` parses.
///
/// Every iteration disables exactly one line that still holds code, and a
/// disabled line is never touched again, so the loop needs at most one
/// iteration per line. The bound is checked explicitly; exceeding it (or
/// running out of code lines while the parser still complains) yields
/// [`AppError::UnrepairableSource`].
///
/// Running `repair` on its own output returns the text unchanged with no events.
pub fn repair(source: &str) -> Result<RepairOutcome, AppError> {
    let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();
    let line_count = lines.len();
    let mut events = Vec::new();
    let mut iterations = 0;

    loop {
        let text = lines.join("\n");
        let Some(locus) = find_syntax_error(&text)? else {
            debug!(iterations, "source parses");
            return Ok(RepairOutcome { text, events });
        };

        iterations += 1;
        if iterations > line_count {
            return Err(AppError::UnrepairableSource {
                iterations,
                line_count,
            });
        }

        let Some(target) = line_to_disable(&lines, locus.line) else {
            return Err(AppError::UnrepairableSource {
                iterations,
                line_count,
            });
        };

        warn!(
            line = locus.line,
            column = locus.column,
            commented_line = target + 1,
            message = %locus.message,
            "commenting out line to repair syntax"
        );
        let original_text = std::mem::take(&mut lines[target]);
        lines[target] = format!("{}{}", COMMENT_MARKER, original_text);
        events.push(RepairEvent {
            locus,
            commented_line: target + 1,
            original_text,
        });
    }
}

fn holds_code(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty() && !trimmed.starts_with(COMMENT_MARKER)
}

/// Picks the 0-based index of the line to comment for an error on `line` (1-based).
///
/// The reported line is preferred. A blank or already commented line cannot be
/// neutralized, so the closest code line before it is used, then the closest after.
fn line_to_disable(lines: &[String], line: usize) -> Option<usize> {
    if lines.is_empty() {
        return None;
    }
    let wanted = line.saturating_sub(1).min(lines.len() - 1);
    if holds_code(&lines[wanted]) {
        return Some(wanted);
    }
    (0..wanted)
        .rev()
        .find(|&i| holds_code(&lines[i]))
        .or_else(|| (wanted + 1..lines.len()).find(|&i| holds_code(&lines[i])))
}
