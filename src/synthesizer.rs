//! Docstring synthesis for every function of a Python text.
//!
//! Spans come from [`extract_functions`] and are matched by start row against
//! the functions a real parse of the whole text declares, so that indented text
//! which only looks like a function (inside a string, say) is never touched.
//! Edits are spliced back by line index, which keeps two functions with
//! identical bodies apart.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::function_extractor::extract_functions;
use crate::indent::{dedent, indent_width, is_blank, leading_indentation, prefix_lines};
use crate::session::{Session, Strategy};
use crate::symbol_extractor::{
    DeclaredFunction, declared_functions, first_function_name, function_docstring,
};
use crate::text_generation::{AnnotationMode, strip_code_fences};
use crate::types::{DocstringRecord, FunctionSpan, ResumeLog};

const DELIMITER: &str = "\"\"\"";
const ALT_DELIMITER: &str = "'''";
const PROMPT_MARKER: &str = ">>>";
const NESTING: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedSource {
    pub text: String,
    pub resume: ResumeLog,
    pub records: Vec<DocstringRecord>,
}

/// Adds a generated docstring to every function declared in `source`.
///
/// # Errors
/// - [`AppError::ParseError`] when `source` does not parse
/// - [`AppError::CredentialError`] when the service rejects the API key
pub fn annotate(session: &Session<'_>, source: &str) -> Result<AnnotatedSource, AppError> {
    let declared: BTreeMap<usize, DeclaredFunction> = declared_functions(source)?
        .into_iter()
        .map(|function| (function.start_line, function))
        .collect();
    let spans = extract_functions(source);
    debug!(spans = spans.len(), declared = declared.len(), "functions located");
    let lines: Vec<&str> = source.split('\n').collect();

    let mut replacements: Vec<Option<String>> = vec![None; spans.len()];
    let mut resume = ResumeLog::new();
    let mut records = Vec::new();

    for (index, span) in spans.iter().enumerate() {
        let Some(function) = declared.get(&span.start_line) else {
            debug!(line = span.start_line + 1, "not a declared function, skipping");
            continue;
        };
        let name = function.name.clone();

        info!(%name, line = span.start_line + 1, "documenting function");
        let outcome = match session.options.strategy {
            Strategy::Insert => document_by_insertion(session, span, function, &lines)?,
            Strategy::Rewrite => document_by_rewrite(session, span, function)?,
        };
        let Some(outcome) = outcome else {
            warn!(%name, "no docstring generated, function left unchanged");
            continue;
        };

        if let Some(summary) = &outcome.summary {
            resume.push(&name, summary);
        }
        records.push(DocstringRecord {
            function_name: name,
            full_docstring: outcome.docstring,
            short_summary: outcome.summary.unwrap_or_default(),
        });
        replacements[index] = Some(outcome.text);
    }

    Ok(AnnotatedSource {
        text: splice(source, &spans, &replacements),
        resume,
        records,
    })
}

struct SpanOutcome {
    text: String,
    docstring: String,
    summary: Option<String>,
}

/// The span may stop short of the function when a nested `def` opens its own
/// span, so the service is shown the whole function as parsed.
fn document_by_insertion(
    session: &Session<'_>,
    span: &FunctionSpan,
    function: &DeclaredFunction,
    lines: &[&str],
) -> Result<Option<SpanOutcome>, AppError> {
    if function.body_on_header_line() {
        debug!(line = span.start_line + 1, "body shares the header line, skipping");
        return Ok(None);
    }
    let code = lines
        .get(function.start_line..function.end_line.min(lines.len()))
        .unwrap_or_default()
        .join("\n");
    let Some(raw) = session.ask(session.options.style.mode(), &dedent(&code))? else {
        return Ok(None);
    };
    let cleaned = normalize_generated(&raw);
    if cleaned.trim().is_empty() {
        return Ok(None);
    }
    let docstring = wrap_docstring(&cleaned);
    let summary = summarize_docstring(session, &docstring)?;
    let at = function.header_end_line + 1 - span.start_line;
    Ok(Some(SpanOutcome {
        text: insert_docstring(&span.text, at, &body_indentation(function, lines), &docstring),
        docstring,
        summary,
    }))
}

fn document_by_rewrite(
    session: &Session<'_>,
    span: &FunctionSpan,
    function: &DeclaredFunction,
) -> Result<Option<SpanOutcome>, AppError> {
    let name = function.name.as_str();
    if function.end_line > span.end_line() {
        debug!(%name, "a nested function splits the span, rewrite skipped");
        return Ok(None);
    }
    let body = trim_trailing_blank_lines(&span.text);
    let Some(raw) = session.ask(AnnotationMode::FunctionRewrite, &dedent(body))? else {
        return Ok(None);
    };
    let rewritten = dedent(trim_trailing_blank_lines(
        strip_code_fences(&normalize_generated(&raw)).trim_start_matches('\n'),
    ));

    // The answer replaces code, so it has to declare the same function and parse.
    match first_function_name(&rewritten) {
        Ok(Some(found)) if found == name => {}
        _ => {
            warn!(%name, "rewritten function rejected");
            return Ok(None);
        }
    }
    let docstring = function_docstring(&rewritten).ok().flatten().unwrap_or_default();
    let summary = if docstring.is_empty() {
        None
    } else {
        summarize_docstring(session, &docstring)?
    };

    let header_indent = leading_indentation(&span.text);
    let tail = &span.text[body.len()..];
    Ok(Some(SpanOutcome {
        text: format!("{}{}", prefix_lines(&rewritten, header_indent), tail),
        docstring,
        summary,
    }))
}

fn summarize_docstring(session: &Session<'_>, docstring: &str) -> Result<Option<String>, AppError> {
    let summary = session
        .ask(AnnotationMode::ShortSummary, docstring)?
        .map(|raw| {
            normalize_generated(&raw)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty());
    Ok(summary)
}

/// Removes interactive-prompt echo markers.
pub fn normalize_generated(text: &str) -> String {
    text.replace(PROMPT_MARKER, "")
}

/// Shapes generated text into a single `"""`-delimited docstring.
///
/// Existing outer delimiters are dropped and every delimiter left inside is
/// turned into `'''`, so the result holds exactly one opening and one closing
/// `"""`. Backslashes are doubled so the text reads back as generated.
pub fn wrap_docstring(generated: &str) -> String {
    let mut body = generated.trim();
    for delimiter in [DELIMITER, ALT_DELIMITER] {
        if body.len() >= 2 * delimiter.len()
            && body.starts_with(delimiter)
            && body.ends_with(delimiter)
        {
            body = &body[delimiter.len()..body.len() - delimiter.len()];
            break;
        }
    }
    if let Some(rest) = body.strip_prefix(DELIMITER) {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix(DELIMITER) {
        body = rest;
    }

    let body = body
        .replace('\\', "\\\\")
        .replace(DELIMITER, ALT_DELIMITER);
    let body = dedent(body.trim_matches('\n'));
    let mut body = body.trim().to_string();
    // A quote right before the closing delimiter would merge with it.
    if body.ends_with('"') {
        body.push(' ');
    }

    if body.contains('\n') {
        format!("{}{}\n{}", DELIMITER, body, DELIMITER)
    } else {
        format!("{}{}{}", DELIMITER, body, DELIMITER)
    }
}

/// Inserts `docstring`, indented by `body_indent`, before line `at` of `text`.
/// Every original line is kept, in order.
pub fn insert_docstring(text: &str, at: usize, body_indent: &str, docstring: &str) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let at = at.min(lines.len());
    let block = prefix_lines(docstring, body_indent);
    let tail = lines.split_off(at);
    lines.extend(block.split('\n').map(str::to_string));
    lines.extend(tail);
    lines.join("\n")
}

/// Indentation of the first body line when it is deeper than the header,
/// else the header's indentation plus one level.
fn body_indentation(function: &DeclaredFunction, lines: &[&str]) -> String {
    let header = lines.get(function.start_line).copied().unwrap_or_default();
    let header_indent = leading_indentation(header);
    lines
        .get(function.header_end_line + 1..function.end_line.min(lines.len()))
        .unwrap_or_default()
        .iter()
        .find(|line| !is_blank(line))
        .filter(|line| indent_width(line) > indent_width(header))
        .map(|line| leading_indentation(line).to_string())
        .unwrap_or_else(|| format!("{}{}", header_indent, NESTING))
}

fn trim_trailing_blank_lines(text: &str) -> &str {
    let mut end = text.len();
    for line in text.split('\n').rev() {
        if !is_blank(line) {
            break;
        }
        end = end.saturating_sub(line.len() + 1);
    }
    &text[..end]
}

/// Rebuilds the text from the gaps between spans and each span or its replacement.
fn splice(source: &str, spans: &[FunctionSpan], replacements: &[Option<String>]) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut cursor = 0;
    for (span, replacement) in spans.iter().zip(replacements) {
        out.extend(&lines[cursor..span.start_line]);
        out.push(replacement.as_deref().unwrap_or(&span.text));
        cursor = span.end_line();
    }
    out.extend(&lines[cursor..]);
    out.join("\n")
}
