// src/symbol_extractor.rs

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::AppError;
use crate::indent::dedent;
use crate::syntax_check::locate_error;

pub fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

/// Parses Python source with tree-sitter.
///
/// Tree-sitter always produces a tree, with `ERROR`/`MISSING` nodes where the
/// text is invalid. Callers that need a clean parse go through
/// [`list_function_names`] or [`crate::syntax_check::find_syntax_error`].
pub fn parse_python(source: &str) -> Result<Tree, AppError> {
    let language = python_language();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| AppError::ConfigError(format!("Error setting language: {}", e)))?;

    parser
        .parse(source, None)
        .ok_or_else(|| AppError::ConfigError("Internal error: Failed to parse source code.".into()))
}

/// A function of a parsed text, located by 0-based rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredFunction {
    pub name: String,
    /// Row of the `def` keyword, or of `async` before it.
    pub start_line: usize,
    /// Row after the last line of the body.
    pub end_line: usize,
    /// Row of the `:` closing the header.
    pub header_end_line: usize,
    pub body_line: usize,
}

impl DeclaredFunction {
    /// True for `def f(): return 1`, where no line can take a docstring.
    pub fn body_on_header_line(&self) -> bool {
        self.body_line <= self.header_end_line
    }
}

/// Every function declared in `source`, methods and nested functions included,
/// in source order.
///
/// Fails with [`AppError::ParseError`] when the text does not parse. The text
/// must start at column 0; use [`first_function_name`] for indented fragments.
pub fn declared_functions(source: &str) -> Result<Vec<DeclaredFunction>, AppError> {
    let tree = parse_python(source)?;
    if let Some(locus) = locate_error(source, &tree) {
        return Err(locus.into());
    }

    let mut functions = Vec::new();
    collect_functions(tree.root_node(), source.as_bytes(), &mut functions);
    Ok(functions)
}

/// Lists the name of every function declared in `source`, in source order.
///
/// A name declared twice appears twice.
pub fn list_function_names(source: &str) -> Result<Vec<String>, AppError> {
    Ok(declared_functions(source)?
        .into_iter()
        .map(|function| function.name)
        .collect())
}

/// Name of the first function declared in an extracted span.
///
/// The span is dedented first because a method body copied out of its class
/// does not parse at its original indentation.
pub fn first_function_name(span_text: &str) -> Result<Option<String>, AppError> {
    let names = list_function_names(&dedent(span_text))?;
    Ok(names.into_iter().next())
}

/// The docstring literal (delimiters included) of the first function in `source`.
pub fn function_docstring(source: &str) -> Result<Option<String>, AppError> {
    let tree = parse_python(source)?;
    if let Some(locus) = locate_error(source, &tree) {
        return Err(locus.into());
    }
    let Some(function) = find_first(tree.root_node(), "function_definition") else {
        return Ok(None);
    };
    let docstring = function
        .child_by_field_name("body")
        .and_then(|body| body.named_child(0))
        .filter(|stmt| stmt.kind() == "expression_statement")
        .and_then(|stmt| stmt.named_child(0))
        .filter(|expr| expr.kind() == "string")
        .and_then(|string| string.utf8_text(source.as_bytes()).ok())
        .map(str::to_string);
    Ok(docstring)
}

fn find_first<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    if node.kind() == kind {
        return Some(node);
    }
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find_map(|child| find_first(child, kind));
    found
}

fn collect_functions(node: Node, source: &[u8], out: &mut Vec<DeclaredFunction>) {
    if node.kind() == "function_definition" {
        if let Some(function) = declared_function(node, source) {
            out.push(function);
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_functions(child, source, out);
    }
}

fn declared_function(node: Node, source: &[u8]) -> Option<DeclaredFunction> {
    let name = node.child_by_field_name("name")?.utf8_text(source).ok()?;
    let body = node.child_by_field_name("body")?;
    let mut cursor = node.walk();
    let header_end_line = node
        .children(&mut cursor)
        .find(|child| child.kind() == ":")
        .map_or(body.start_position().row, |colon| colon.start_position().row);
    let end = node.end_position();
    let end_line = if end.column == 0 { end.row } else { end.row + 1 };

    Some(DeclaredFunction {
        name: name.to_string(),
        start_line: node.start_position().row,
        end_line,
        header_end_line,
        body_line: body.start_position().row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_functions_methods_and_nested_functions() {
        let src = r#"
import os

def top(a):
    def helper():
        return 1
    return helper()

class Greeter:
    def __init__(self, name):
        self.name = name

    async def greet(self):
        return self.name

@decorator
def decorated():
    pass
"#;
        let names = list_function_names(src).expect("valid python");
        assert_eq!(names, vec!["top", "helper", "__init__", "greet", "decorated"]);
    }

    #[test]
    fn declared_functions_carry_their_rows() {
        let src = "@cache\nasync def fetch(url,\n          timeout):\n    return url\n\ndef one(): return 1\n";
        let functions = declared_functions(src).expect("valid python");
        assert_eq!(
            functions,
            vec![
                DeclaredFunction {
                    name: "fetch".to_string(),
                    start_line: 1,
                    end_line: 4,
                    header_end_line: 2,
                    body_line: 3,
                },
                DeclaredFunction {
                    name: "one".to_string(),
                    start_line: 5,
                    end_line: 6,
                    header_end_line: 5,
                    body_line: 5,
                },
            ]
        );
        assert!(!functions[0].body_on_header_line());
        assert!(functions[1].body_on_header_line());
    }

    #[test]
    fn duplicate_names_are_listed_per_declaration() {
        let src = "class A:\n    def run(self):\n        pass\n\nclass B:\n    def run(self):\n        pass\n";
        let names = list_function_names(src).expect("valid python");
        assert_eq!(names, vec!["run", "run"]);
    }

    #[test]
    fn invalid_source_is_a_parse_error() {
        let err = list_function_names("def f(:\n    return 1\n").unwrap_err();
        assert!(matches!(err, AppError::ParseError { .. }), "got {err:?}");
    }

    #[test]
    fn indented_span_is_resolved_after_dedent() {
        let span = "    def method(self, x):\n        return x\n";
        assert_eq!(
            first_function_name(span).expect("parses"),
            Some("method".to_string())
        );
    }

    #[test]
    fn span_without_function_resolves_to_none() {
        assert_eq!(first_function_name("x = 1\n").expect("parses"), None);
    }

    #[test]
    fn docstring_of_first_function() {
        let src = "def f(a):\n    \"\"\"Adds one.\"\"\"\n    return a + 1\n";
        assert_eq!(
            function_docstring(src).expect("parses").as_deref(),
            Some("\"\"\"Adds one.\"\"\"")
        );
        assert_eq!(function_docstring("def g():\n    return 1\n").expect("parses"), None);
    }

    #[test]
    fn function_names_inside_strings_are_ignored() {
        let src = "TEMPLATE = \"\"\"\n    def ghost(a):\n        return a\n\"\"\"\n";
        assert!(list_function_names(src).expect("valid python").is_empty());
    }
}
