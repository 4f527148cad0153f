//! Locating the first syntax error of a Python text.
//!
//! Tree-sitter alone accepts more than CPython does, so three passes decide:
//!
//! 1. An indentation pass tracks the INDENT/DEDENT stack over logical lines,
//!    which tree-sitter's error recovery silently absorbs.
//! 2. When the tree holds errors, problems the tokenizer would see
//!    (unterminated strings, unbalanced brackets) are preferred over the first
//!    `ERROR` or `MISSING` node, whose position after recovery is unpredictable.
//! 3. A clean tree is checked for what `compile()` rejects after parsing:
//!    Python 2 statements, `return` or `yield` outside a function, loop control
//!    outside a loop and repeated parameter names.

use std::collections::HashSet;

use tree_sitter::{Node, Tree};

use crate::error::AppError;
use crate::symbol_extractor::parse_python;
use crate::types::SyntaxErrorLocus;

/// Returns the first syntax error of `source`, or `None` when it parses cleanly.
pub fn find_syntax_error(source: &str) -> Result<Option<SyntaxErrorLocus>, AppError> {
    let tree = parse_python(source)?;
    Ok(locate_error(source, &tree))
}

pub fn locate_error(source: &str, tree: &Tree) -> Option<SyntaxErrorLocus> {
    let root = tree.root_node();
    let indentation = indentation_error(source);
    if !root.has_error() {
        return indentation.or_else(|| semantic_error(root, source.as_bytes(), Scope::default()));
    }
    // Lexical problems win ties; otherwise the earlier line is reported first.
    if let Some(locus) = [lexical_error(source), indentation]
        .into_iter()
        .flatten()
        .min_by_key(|locus| locus.line)
    {
        return Some(locus);
    }
    let locus = first_error_node(root)
        .map(node_locus)
        .unwrap_or_else(|| SyntaxErrorLocus {
            line: 1,
            column: 0,
            message: "invalid syntax".to_string(),
        });
    Some(locus)
}

fn first_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error_node(child) {
            return Some(found);
        }
    }
    None
}

fn node_locus(node: Node<'_>) -> SyntaxErrorLocus {
    if node.is_missing() {
        let point = node.start_position();
        return SyntaxErrorLocus {
            line: point.row + 1,
            column: point.column,
            message: format!("expected '{}'", node.kind()),
        };
    }

    // An ERROR node may swallow comments ahead of the offending token.
    let mut cursor = node.walk();
    let anchor = node
        .children(&mut cursor)
        .find(|child| child.kind() != "comment")
        .unwrap_or(node);
    let point = anchor.start_position();
    SyntaxErrorLocus {
        line: point.row + 1,
        column: point.column,
        message: "invalid syntax".to_string(),
    }
}

/// Where a node sits relative to the enclosing function and loop.
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_function: bool,
    in_loop: bool,
}

fn error_at(node: Node<'_>, message: impl Into<String>) -> SyntaxErrorLocus {
    let point = node.start_position();
    SyntaxErrorLocus {
        line: point.row + 1,
        column: point.column,
        message: message.into(),
    }
}

/// Errors CPython raises while compiling a tree that parsed, in document order.
fn semantic_error(node: Node<'_>, source: &[u8], scope: Scope) -> Option<SyntaxErrorLocus> {
    match node.kind() {
        "print_statement" => {
            return Some(error_at(
                node,
                "Missing parentheses in call to 'print'. Did you mean print(...)?",
            ));
        }
        "exec_statement" => {
            return Some(error_at(
                node,
                "Missing parentheses in call to 'exec'. Did you mean exec(...)?",
            ));
        }
        "<>" => return Some(error_at(node, "invalid syntax")),
        "return_statement" if !scope.in_function => {
            return Some(error_at(node, "'return' outside function"));
        }
        "yield" if !scope.in_function => return Some(error_at(node, "'yield' outside function")),
        "break_statement" if !scope.in_loop => return Some(error_at(node, "'break' outside loop")),
        "continue_statement" if !scope.in_loop => {
            return Some(error_at(node, "'continue' not properly in loop"));
        }
        "function_definition" | "lambda" => {
            if let Some(locus) = duplicate_parameter(node, source) {
                return Some(locus);
            }
        }
        _ => {}
    }

    let inner = match node.kind() {
        "function_definition" | "lambda" => Scope {
            in_function: true,
            in_loop: false,
        },
        "class_definition" => Scope::default(),
        _ => scope,
    };
    // Only the body of a loop is inside it; its `else` clause is not.
    let loop_body = match node.kind() {
        "for_statement" | "while_statement" => node.child_by_field_name("body").map(|b| b.id()),
        _ => None,
    };

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let child_scope = if Some(child.id()) == loop_body {
            Scope {
                in_loop: true,
                ..inner
            }
        } else {
            inner
        };
        if let Some(locus) = semantic_error(child, source, child_scope) {
            return Some(locus);
        }
    }
    None
}

fn duplicate_parameter(function: Node<'_>, source: &[u8]) -> Option<SyntaxErrorLocus> {
    let parameters = function.child_by_field_name("parameters")?;
    let mut seen = HashSet::new();
    let mut cursor = parameters.walk();
    for param in parameters.named_children(&mut cursor) {
        let Some(name) = parameter_identifier(param) else {
            continue;
        };
        let Ok(text) = name.utf8_text(source) else {
            continue;
        };
        if !seen.insert(text) {
            return Some(error_at(
                name,
                format!("duplicate argument '{}' in function definition", text),
            ));
        }
    }
    None
}

fn parameter_identifier(param: Node<'_>) -> Option<Node<'_>> {
    match param.kind() {
        "identifier" => Some(param),
        "default_parameter" | "typed_default_parameter" => param.child_by_field_name("name"),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            param.named_child(0).and_then(parameter_identifier)
        }
        _ => None,
    }
}

const TAB_SIZE: usize = 8;

/// A logical line, remembered while it may still turn out to open a block.
#[derive(Debug)]
struct Statement {
    line: usize,
    keyword: String,
}

impl Statement {
    fn expected_block(&self, line: usize, column: usize) -> SyntaxErrorLocus {
        let message = match self.keyword.as_str() {
            "def" => format!(
                "expected an indented block after function definition on line {}",
                self.line
            ),
            "class" => format!(
                "expected an indented block after class definition on line {}",
                self.line
            ),
            kw @ ("if" | "elif" | "else" | "for" | "while" | "with" | "try" | "except"
            | "finally" | "match" | "case") => format!(
                "expected an indented block after '{}' statement on line {}",
                kw, self.line
            ),
            _ => "expected an indented block".to_string(),
        };
        SyntaxErrorLocus {
            line,
            column,
            message,
        }
    }
}

/// Indentation errors, found the way the tokenizer emits INDENT and DEDENT.
///
/// Only lines that start a logical line count: blank and comment-only lines
/// are skipped, as are lines inside brackets, strings or after a backslash.
fn indentation_error(source: &str) -> Option<SyntaxErrorLocus> {
    let mut scanner = Scanner::new(source);
    let mut levels: Vec<usize> = vec![0];
    let mut depth = 0usize;
    let mut at_line_start = true;
    let mut statement: Option<Statement> = None;
    let mut opener: Option<Statement> = None;
    let mut last_token: Option<char> = None;

    loop {
        if at_line_start {
            let width = scanner.measure_indent();
            match scanner.peek(0) {
                None => break,
                Some('#') => {
                    scanner.skip_comment();
                    continue;
                }
                Some('\r' | '\n') => {
                    scanner.bump();
                    continue;
                }
                Some(_) => {}
            }

            let (line, column) = (scanner.line, scanner.column);
            let top = levels.last().copied().unwrap_or(0);
            if let Some(open) = opener.take() {
                if width <= top {
                    return Some(open.expected_block(line, column));
                }
                levels.push(width);
            } else if width > top {
                return Some(SyntaxErrorLocus {
                    line,
                    column,
                    message: "unexpected indent".to_string(),
                });
            } else {
                while levels.last().is_some_and(|&level| level > width) {
                    levels.pop();
                }
                if levels.last() != Some(&width) {
                    return Some(SyntaxErrorLocus {
                        line,
                        column,
                        message: "unindent does not match any outer indentation level"
                            .to_string(),
                    });
                }
            }

            statement = Some(Statement {
                line,
                keyword: scanner.statement_keyword(),
            });
            last_token = None;
            at_line_start = false;
        }

        let Some(c) = scanner.peek(0) else {
            break;
        };
        match c {
            '#' => scanner.skip_comment(),
            '\\' => {
                scanner.bump();
                scanner.bump();
            }
            '\n' => {
                scanner.bump();
                if depth == 0 {
                    if last_token == Some(':') {
                        opener = statement.take();
                    }
                    at_line_start = true;
                }
            }
            '"' | '\'' => {
                if scanner.skip_string(c).is_err() {
                    // Reported by the lexical pass.
                    return None;
                }
                last_token = Some(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                last_token = Some(c);
                scanner.bump();
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                last_token = Some(c);
                scanner.bump();
            }
            c if c.is_whitespace() => {
                scanner.bump();
            }
            _ => {
                last_token = Some(c);
                scanner.bump();
            }
        }
    }

    if !at_line_start && depth == 0 && last_token == Some(':') {
        opener = statement.take();
    }
    opener.map(|open| {
        let line = scanner.line.max(open.line + 1);
        open.expected_block(line, 0)
    })
}

#[derive(Debug, Clone, Copy)]
struct OpenBracket {
    ch: char,
    line: usize,
    column: usize,
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 0,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consumes leading whitespace and returns its width, tabs rounding up to
    /// the next multiple of eight.
    fn measure_indent(&mut self) -> usize {
        let mut width = 0;
        loop {
            match self.peek(0) {
                Some(' ') => width += 1,
                Some('\t') => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                Some('\x0c') => width = 0,
                _ => return width,
            }
            self.bump();
        }
    }

    fn word_at(&self, start: usize) -> (String, usize) {
        let mut end = start;
        while self
            .chars
            .get(end)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_')
        {
            end += 1;
        }
        (self.chars[start..end].iter().collect(), end)
    }

    /// The keyword starting the statement at the current position, `async` skipped.
    fn statement_keyword(&self) -> String {
        let (word, end) = self.word_at(self.pos);
        if word != "async" {
            return word;
        }
        let mut next = end;
        while self.chars.get(next).is_some_and(|c| *c == ' ' || *c == '\t') {
            next += 1;
        }
        self.word_at(next).0
    }

    fn skip_comment(&mut self) {
        while self.peek(0).is_some_and(|c| c != '\n') {
            self.bump();
        }
    }

    /// Consumes a string literal starting at the current quote.
    fn skip_string(&mut self, quote: char) -> Result<(), SyntaxErrorLocus> {
        let (line, column) = (self.line, self.column);
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let unterminated = || SyntaxErrorLocus {
            line,
            column,
            message: if triple {
                "unterminated triple-quoted string literal".to_string()
            } else {
                "unterminated string literal".to_string()
            },
        };

        let width = if triple { 3 } else { 1 };
        for _ in 0..width {
            self.bump();
        }
        loop {
            match self.peek(0) {
                None => return Err(unterminated()),
                Some('\\') => {
                    self.bump();
                    self.bump();
                }
                Some('\n') if !triple => return Err(unterminated()),
                Some(c) if c == quote => {
                    if !triple {
                        self.bump();
                        return Ok(());
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.bump();
                        self.bump();
                        self.bump();
                        return Ok(());
                    }
                    self.bump();
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Token-level problems, reported in the order a tokenizer detects them.
fn lexical_error(source: &str) -> Option<SyntaxErrorLocus> {
    let mut scanner = Scanner::new(source);
    let mut stack: Vec<OpenBracket> = Vec::new();

    while let Some(c) = scanner.peek(0) {
        let (line, column) = (scanner.line, scanner.column);
        match c {
            '#' => scanner.skip_comment(),
            '\\' => {
                scanner.bump();
                scanner.bump();
            }
            '"' | '\'' => {
                if let Err(locus) = scanner.skip_string(c) {
                    return Some(locus);
                }
            }
            '(' | '[' | '{' => {
                stack.push(OpenBracket { ch: c, line, column });
                scanner.bump();
            }
            ')' | ']' | '}' => {
                match stack.pop() {
                    None => {
                        return Some(SyntaxErrorLocus {
                            line,
                            column,
                            message: format!("unmatched '{}'", c),
                        });
                    }
                    Some(open) if closer_for(open.ch) != c => {
                        let mut message = format!(
                            "closing parenthesis '{}' does not match opening parenthesis '{}'",
                            c, open.ch
                        );
                        if open.line != line {
                            message.push_str(&format!(" on line {}", open.line));
                        }
                        return Some(SyntaxErrorLocus {
                            line,
                            column,
                            message,
                        });
                    }
                    Some(_) => {}
                }
                scanner.bump();
            }
            _ => {
                scanner.bump();
            }
        }
    }

    stack.last().map(|open| SyntaxErrorLocus {
        line: open.line,
        column: open.column,
        message: format!("'{}' was never closed", open.ch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Option<SyntaxErrorLocus> {
        find_syntax_error(source).expect("parser available")
    }

    #[test]
    fn valid_source_has_no_error() {
        assert_eq!(check("def f(a, b):\n    return (a + b)\n"), None);
        assert_eq!(check(""), None);
        assert_eq!(check("# only a comment\n"), None);
    }

    #[test]
    fn unclosed_paren_points_at_opener() {
        let locus = check("def f():\n    x = (\n    return x").expect("error");
        assert_eq!(locus.line, 2);
        assert_eq!(locus.column, 8);
        assert_eq!(locus.message, "'(' was never closed");
    }

    #[test]
    fn unmatched_closer_points_at_closer() {
        let locus = check("x = 1\ny = 2)\n").expect("error");
        assert_eq!(locus.line, 2);
        assert_eq!(locus.message, "unmatched ')'");
    }

    #[test]
    fn mismatched_closer_names_both_brackets() {
        let locus = check("x = [1,\n     2)\n").expect("error");
        assert_eq!(locus.line, 2);
        assert_eq!(
            locus.message,
            "closing parenthesis ')' does not match opening parenthesis '[' on line 1"
        );
    }

    #[test]
    fn unterminated_triple_quote_points_at_opener() {
        let locus = check("def f():\n    \"\"\"doc\n    return 1\n").expect("error");
        assert_eq!(locus.line, 2);
        assert_eq!(locus.message, "unterminated triple-quoted string literal");
    }

    #[test]
    fn unterminated_single_quote_string() {
        let locus = check("x = 'abc\ny = 2\n").expect("error");
        assert_eq!(locus.line, 1);
        assert_eq!(locus.message, "unterminated string literal");
    }

    #[test]
    fn brackets_in_strings_and_comments_are_ignored() {
        let lexical = lexical_error("s = '(['  # )\nt = \"\"\"\n)\n\"\"\"\n");
        assert_eq!(lexical, None);
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        assert_eq!(lexical_error("s = 'it\\'s'\nt = \"a\\\"b\"\n"), None);
    }

    #[test]
    fn missing_indented_block_after_def() {
        let locus = check("def f():\nreturn 1\n").expect("error");
        assert_eq!(locus.line, 2);
        assert_eq!(locus.column, 0);
        assert_eq!(
            locus.message,
            "expected an indented block after function definition on line 1"
        );

        let locus = check("if ready:\n").expect("error");
        assert_eq!(
            locus.message,
            "expected an indented block after 'if' statement on line 1"
        );
    }

    #[test]
    fn dedent_to_unknown_level() {
        let locus = check("def f():\n    x = 1\n  y = 2\n").expect("error");
        assert_eq!(locus.line, 3);
        assert_eq!(locus.column, 2);
        assert_eq!(locus.message, "unindent does not match any outer indentation level");
    }

    #[test]
    fn indent_without_block_opener() {
        let locus = check("x = 1\n    y = 2\n").expect("error");
        assert_eq!(locus.line, 2);
        assert_eq!(locus.column, 4);
        assert_eq!(locus.message, "unexpected indent");
    }

    #[test]
    fn python2_print_is_rejected() {
        let locus = check("print \"hello\"\n").expect("error");
        assert_eq!(locus.line, 1);
        assert_eq!(
            locus.message,
            "Missing parentheses in call to 'print'. Did you mean print(...)?"
        );
        assert_eq!(check("print(\"hello\")\n"), None);
    }

    #[test]
    fn return_and_yield_need_a_function() {
        let locus = check("x = 1\nreturn 1\n").expect("error");
        assert_eq!((locus.line, locus.message.as_str()), (2, "'return' outside function"));

        let locus = check("class A:\n    return 1\n").expect("error");
        assert_eq!((locus.line, locus.message.as_str()), (2, "'return' outside function"));

        let locus = check("yield 1\n").expect("error");
        assert_eq!(locus.message, "'yield' outside function");

        assert_eq!(check("def f():\n    yield 1\n    return\n"), None);
    }

    #[test]
    fn loop_control_needs_a_loop() {
        let locus = check("break\n").expect("error");
        assert_eq!(locus.message, "'break' outside loop");

        let src = "for x in y:\n    def g():\n        continue\n";
        let locus = check(src).expect("error");
        assert_eq!((locus.line, locus.message.as_str()), (3, "'continue' not properly in loop"));

        assert_eq!(check("while True:\n    if x:\n        break\n    continue\n"), None);
    }

    #[test]
    fn repeated_parameter_is_rejected() {
        let locus = check("def f(a, a):\n    return a\n").expect("error");
        assert_eq!(locus.line, 1);
        assert_eq!(locus.column, 9);
        assert_eq!(locus.message, "duplicate argument 'a' in function definition");

        let locus = check("g = lambda x, *x: x\n").expect("error");
        assert_eq!(locus.message, "duplicate argument 'x' in function definition");
    }

    #[test]
    fn valid_layouts_pass_every_check() {
        let src = r#"import os

@decorator(
    option=True,
)
class Store(Base):
    """Doc.

  oddly indented doc line
    """

    def get(self, key,
            default=None):  # trailing comment:
        if key in self.data: return self.data[key]
        elif key:
            value = (default
       if default else None)
        else:
            value = None
        total = 1 + \
  2
        return value

    async def fetch(self):
        async for x in self.source:
            yield x


def outer():
    def inner(): return 1
    table = {
        "a": 1,
    }
    return inner, table
"#;
        assert_eq!(indentation_error(src), None);
        assert_eq!(check(src), None);
        assert_eq!(indentation_error("\tif x:\n\t\tpass\n"), Some(SyntaxErrorLocus {
            line: 1,
            column: 1,
            message: "unexpected indent".to_string(),
        }));
        assert_eq!(indentation_error("if x:\n\tpass\nelse:\n        pass\n"), None);
        assert_eq!(
            indentation_error("def f():\n    x = 1\n# column zero\n      # deeper\n    return x\n"),
            None
        );
    }
}
