// src/summarizer.rs

use std::collections::BTreeSet;

use tree_sitter::Node;
use tracing::debug;

use crate::error::AppError;
use crate::session::Session;
use crate::symbol_extractor::parse_python;
use crate::syntax_check::locate_error;
use crate::text_generation::{AnnotationMode, strip_code_fences};
use crate::types::ResumeLog;

const RESUME_HEADING: &str = "Summary of function : ";

/// The outline of a file sent to the service when asking for its purpose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralDigest {
    /// Imported module names.
    pub imports: BTreeSet<String>,
    /// `name(arg, ...) --> ret, ...` per function and `class Name` per class, in source order.
    pub entries: Vec<String>,
}

impl StructuralDigest {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.entries.is_empty()
    }

    pub fn render(&self, resume: &ResumeLog) -> String {
        let mut out = String::new();
        for module in &self.imports {
            out.push_str(&format!("import {}\n", module));
        }
        for entry in &self.entries {
            out.push_str(entry);
            out.push('\n');
        }
        out.push_str(RESUME_HEADING);
        out.push('\n');
        out.push_str(&resume.to_string());
        out
    }
}

/// Collects imports, function signatures with their returned names, and classes.
pub fn digest(source: &str) -> Result<StructuralDigest, AppError> {
    let tree = parse_python(source)?;
    if let Some(locus) = locate_error(source, &tree) {
        return Err(locus.into());
    }
    let mut digest = StructuralDigest::default();
    walk(tree.root_node(), source.as_bytes(), &mut digest);
    Ok(digest)
}

fn walk(node: Node, source: &[u8], digest: &mut StructuralDigest) {
    match node.kind() {
        "function_definition" => {
            if let Some(entry) = function_entry(node, source) {
                digest.entries.push(entry);
            }
        }
        "class_definition" => {
            if let Some(name) = field_text(node, "name", source) {
                digest.entries.push(format!("class {}", name));
            }
        }
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                let module = if child.kind() == "aliased_import" {
                    field_text(child, "name", source)
                } else {
                    text(child, source)
                };
                if let Some(module) = module {
                    digest.imports.insert(module.to_string());
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = field_text(node, "module_name", source) {
                digest.imports.insert(module.to_string());
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, digest);
    }
}

fn function_entry(node: Node, source: &[u8]) -> Option<String> {
    let name = field_text(node, "name", source)?;
    let params = node
        .child_by_field_name("parameters")
        .map(|p| parameter_names(p, source))
        .unwrap_or_default();

    let mut returns = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        collect_returns(body, source, &mut returns);
    }

    let signature = format!("{}({})", name, params.join(", "));
    if returns.is_empty() {
        Some(signature)
    } else {
        Some(format!("{} --> {}", signature, returns.join(", ")))
    }
}

/// Positional parameter names. Collection stops at `*`, `*args` or `**kwargs`,
/// since only keyword-only parameters can follow.
fn parameter_names(parameters: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = parameters.walk();
    for param in parameters.named_children(&mut cursor) {
        let name = match param.kind() {
            "list_splat_pattern" | "dictionary_splat_pattern" | "keyword_separator" => break,
            "typed_parameter"
                if param
                    .named_child(0)
                    .is_some_and(|n| n.kind() != "identifier") =>
            {
                break;
            }
            "identifier" => text(param, source),
            "default_parameter" | "typed_default_parameter" => field_text(param, "name", source),
            "typed_parameter" => param.named_child(0).and_then(|n| text(n, source)),
            _ => None,
        };
        if let Some(name) = name {
            names.push(name.to_string());
        }
    }
    names
}

/// Identifier names returned by a function, not looking into nested scopes.
fn collect_returns(node: Node, source: &[u8], out: &mut Vec<String>) {
    match node.kind() {
        "function_definition" | "class_definition" => return,
        "return_statement" => {
            if let Some(value) = node.named_child(0) {
                push_returned_names(value, source, out);
            }
            return;
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_returns(child, source, out);
    }
}

fn push_returned_names(value: Node, source: &[u8], out: &mut Vec<String>) {
    match value.kind() {
        "identifier" => {
            if let Some(name) = text(value, source) {
                if !out.iter().any(|n| n == name) {
                    out.push(name.to_string());
                }
            }
        }
        "expression_list" | "tuple" | "parenthesized_expression" => {
            let mut cursor = value.walk();
            for element in value.named_children(&mut cursor) {
                push_returned_names(element, source, out);
            }
        }
        _ => {}
    }
}

fn text<'s>(node: Node, source: &'s [u8]) -> Option<&'s str> {
    node.utf8_text(source).ok()
}

fn field_text<'s>(node: Node, field: &str, source: &'s [u8]) -> Option<&'s str> {
    node.child_by_field_name(field).and_then(|n| text(n, source))
}

/// Asks the service for a comment describing the whole file.
///
/// Returns `Ok(None)` when the file declares nothing worth describing or the
/// service gave no usable answer.
pub fn summarize(
    session: &Session<'_>,
    source: &str,
    resume: &ResumeLog,
) -> Result<Option<String>, AppError> {
    let digest = digest(source)?;
    if digest.is_empty() && resume.is_empty() {
        debug!("nothing to summarize");
        return Ok(None);
    }
    let answer = session.ask(AnnotationMode::FileSummary, &digest.render(resume))?;
    Ok(answer.and_then(|a| to_comment_block(&strip_code_fences(&a))))
}

/// Turns a generated answer into a Python comment block.
///
/// Answers that already are `#` comments or a triple-quoted block are kept.
pub fn to_comment_block(answer: &str) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    let already_commented = answer
        .lines()
        .filter(|l| !l.trim().is_empty())
        .all(|l| l.trim_start().starts_with('#'));
    let quoted = ["\"\"\"", "'''"]
        .iter()
        .any(|q| answer.len() >= 2 * q.len() && answer.starts_with(q) && answer.ends_with(q));
    if already_commented || quoted {
        return Some(answer.to_string());
    }

    let block = answer
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.is_empty() {
                "#".to_string()
            } else {
                format!("# {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(block)
}

/// Puts `comment` at the top of `source`, after any shebang or encoding line.
pub fn prepend_comment(source: &str, comment: &str) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut keep = 0;
    while keep < 2 && keep < lines.len() && is_preamble(lines[keep], keep) {
        keep += 1;
    }
    let mut out: Vec<&str> = lines[..keep].to_vec();
    out.extend(comment.split('\n'));
    out.extend(&lines[keep..]);
    out.join("\n")
}

fn is_preamble(line: &str, index: usize) -> bool {
    (index == 0 && line.starts_with("#!"))
        || (line.starts_with('#') && (line.contains("coding:") || line.contains("coding=")))
}
