// src/function_extractor.rs

use crate::indent::{INDENT_UNIT, indent_width, is_blank};
use crate::types::FunctionSpan;

const DEF_KEYWORD: &str = "def ";
const ASYNC_KEYWORD: &str = "async ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Header,
    Body,
}

/// The span currently being accumulated by the scanner.
#[derive(Debug)]
struct OpenSpan {
    start_line: usize,
    end_line: usize,
    indent: usize,
    header_threshold: usize,
    header_line_count: usize,
    bracket_depth: i32,
    header_closed: bool,
    mode: Mode,
}

impl OpenSpan {
    fn start(index: usize, line: &str, indent: usize) -> Self {
        let header_threshold = line.find('(').map(|pos| pos + 1).unwrap_or(usize::MAX);
        let bracket_depth = bracket_delta(line);
        Self {
            start_line: index,
            end_line: index + 1,
            indent,
            header_threshold,
            header_line_count: 1,
            bracket_depth,
            header_closed: header_is_closed(bracket_depth, line),
            mode: Mode::Header,
        }
    }

    /// Offers a header-mode line. Returns false when the line is not part of the
    /// declaration, which ends header mode.
    fn accept_header_line(&mut self, index: usize, line: &str, indent: usize) -> bool {
        let continues = !self.header_closed
            && (self.bracket_depth > 0 || indent >= self.header_threshold);
        if !continues {
            self.mode = Mode::Body;
            return false;
        }
        self.header_line_count += 1;
        self.end_line = index + 1;
        self.bracket_depth += bracket_delta(line);
        self.header_closed = header_is_closed(self.bracket_depth, line);
        true
    }

    fn finish(self, lines: &[&str]) -> FunctionSpan {
        FunctionSpan {
            text: lines[self.start_line..self.end_line].join("\n"),
            start_line: self.start_line,
            base_indent: self.indent / INDENT_UNIT,
            header_line_count: self.header_line_count,
        }
    }
}

fn header_is_closed(depth: i32, line: &str) -> bool {
    depth <= 0 && !strip_comment(line).trim_end().ends_with('\\')
}

/// Extracts every `def` block of `source` using indentation alone.
///
/// Spans come back in source order and never overlap. The scan works in two
/// phases per function: the header (a possibly multi-line parameter list) and
/// the body, which lasts until a non-blank line is indented no deeper than the
/// `def` line itself. Blank lines never end a span, so trailing blank lines
/// belong to the preceding function.
///
/// No parse is needed: text that does not parse still yields spans as long as
/// it is indented.
pub fn extract_functions(source: &str) -> Vec<FunctionSpan> {
    let lines: Vec<&str> = source.split('\n').collect();
    let mut spans = Vec::new();
    let mut current: Option<OpenSpan> = None;

    for (index, line) in lines.iter().enumerate() {
        let indent = indent_width(line);

        if is_declaration(line) {
            if let Some(open) = current.take() {
                spans.push(open.finish(&lines));
            }
            current = Some(OpenSpan::start(index, line, indent));
            continue;
        }

        let Some(open) = current.as_mut() else {
            continue;
        };

        if open.mode == Mode::Header && open.accept_header_line(index, line, indent) {
            continue;
        }

        // Body rules. The terminating line is not part of the span; since it is
        // not a `def`, it cannot open the next one either.
        if is_blank(line) || indent > open.indent {
            open.end_line = index + 1;
        } else if let Some(open) = current.take() {
            spans.push(open.finish(&lines));
        }
    }

    if let Some(open) = current.take() {
        spans.push(open.finish(&lines));
    }

    spans
}

/// `def name(` or `async def name(`, at any indentation.
fn is_declaration(line: &str) -> bool {
    let stripped = line.trim_start();
    stripped
        .strip_prefix(ASYNC_KEYWORD)
        .map_or(stripped, str::trim_start)
        .starts_with(DEF_KEYWORD)
}

/// Net change in bracket depth over a single line, ignoring string literals and comments.
fn bracket_delta(line: &str) -> i32 {
    let chars: Vec<char> = line.chars().collect();
    let mut depth = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '#' => break,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            quote @ ('"' | '\'') => {
                let triple = chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote);
                i += if triple { 3 } else { 1 };
                while i < chars.len() {
                    if chars[i] == '\\' {
                        i += 2;
                        continue;
                    }
                    if chars[i] == quote
                        && (!triple
                            || (chars.get(i + 1) == Some(&quote)
                                && chars.get(i + 2) == Some(&quote)))
                    {
                        i += if triple { 2 } else { 0 };
                        break;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    depth
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(source: &str, spans: &[FunctionSpan]) -> String {
        let lines: Vec<&str> = source.split('\n').collect();
        let mut out: Vec<String> = Vec::new();
        let mut cursor = 0;
        for span in spans {
            out.extend(lines[cursor..span.start_line].iter().map(|l| l.to_string()));
            out.push(span.text.clone());
            cursor = span.end_line();
        }
        out.extend(lines[cursor..].iter().map(|l| l.to_string()));
        out.join("\n")
    }

    #[test]
    fn async_functions_open_spans() {
        let source = "class Client:\n    async def fetch(self,\n                    url):\n        return url\n\nasync  def main():\n    pass\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[0].header_line_count, 2);
        assert_eq!(spans[0].base_indent, 1);
        assert_eq!(spans[1].text, "async  def main():\n    pass\n");
        assert!(!is_declaration("asyncdef f():"));
        assert!(!is_declaration("async with lock:"));
    }

    #[test]
    fn single_function_scenario() {
        let spans = extract_functions("def add(a, b):\n    return a + b");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "def add(a, b):\n    return a + b");
        assert_eq!(spans[0].base_indent, 0);
        assert_eq!(spans[0].header_line_count, 1);
        assert_eq!(spans[0].start_line, 0);
    }

    #[test]
    fn consecutive_one_line_functions_are_not_merged() {
        let source = "def f(): return 1\ndef g(): return 2\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "def f(): return 1");
        assert_eq!(spans[1].text, "def g(): return 2\n");
    }

    #[test]
    fn multi_line_header_aligned_with_paren() {
        let source = "def f(a,\n      b,\n      c):\n    return a\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].header_line_count, 3);
        assert_eq!(spans[0].text, source);
    }

    #[test]
    fn hanging_indent_header_is_tracked_by_brackets() {
        let source = "def f(\n    a,\n    b,\n):\n    return a\nx = 1";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].header_line_count, 4);
        assert_eq!(spans[0].text, "def f(\n    a,\n    b,\n):\n    return a");
    }

    #[test]
    fn brackets_inside_defaults_strings_do_not_confuse_header() {
        let source = "def f(x=\")(\", y='['):  # (\n    return x\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].header_line_count, 1);
    }

    #[test]
    fn blank_lines_stay_inside_span() {
        let source = "def f():\n    a = 1\n\n    return a\n\nprint(f())";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "def f():\n    a = 1\n\n    return a\n");
    }

    #[test]
    fn methods_are_spans_with_base_indent() {
        let source = "class A:\n    def m(self):\n        return 1\n\n    def n(self):\n        return 2\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.base_indent == 1));
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[1].start_line, 4);
    }

    #[test]
    fn nested_def_cuts_the_outer_span() {
        let source = "def outer():\n    x = 1\n    def inner():\n        pass\n    return x\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "def outer():\n    x = 1");
        assert_eq!(spans[1].text, "    def inner():\n        pass");
        // `return x` ends the inner span and starts nothing.
        assert_eq!(spans[1].end_line(), 4);
    }

    #[test]
    fn nested_class_before_more_statements_stays_in_function() {
        let source = "def f():\n    class A:\n        x = 1\n            \n    y = A()\n    return y\nz = 0";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end_line(), 6);
    }

    #[test]
    fn deep_dedent_inside_control_flow_keeps_function_open() {
        let source = "def f(x):\n    if x:\n        for i in x:\n            if i:\n                return i\n    return None\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, source);
    }

    #[test]
    fn spans_and_gaps_reconstruct_the_source() {
        let source = "import os\n\n\ndef a(x):\n    return x\n\n\nclass B:\n    '''doc'''\n    def c(self,\n          y):\n        return y\n\n    z = 3\n\ndef d(): pass\nprint(a(1))\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 3);
        assert_eq!(reconstruct(source, &spans), source);
    }

    #[test]
    fn reextracting_an_isolated_span_is_stable() {
        let source = "class K:\n    def m(self, a,\n          b):\n        if a:\n            return b\n        return a\n";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        let isolated = crate::indent::dedent(&spans[0].text);
        let again = extract_functions(&isolated);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].text, isolated);
        assert_eq!(again[0].header_line_count, spans[0].header_line_count);
    }

    #[test]
    fn malformed_but_indented_text_still_extracts() {
        let source = "def broken(:\n    x = (\n    return x";
        let spans = extract_functions(source);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, source);
    }

    #[test]
    fn no_functions_yield_no_spans() {
        assert!(extract_functions("x = 1\ny = 2\n").is_empty());
        assert!(extract_functions("").is_empty());
    }
}
