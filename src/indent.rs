// src/indent.rs

/// Columns per indentation level.
pub const INDENT_UNIT: usize = 4;

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Number of leading whitespace characters of `line`.
pub fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Returns the spaces/tabs that prefix the first non-blank line of `text`.
///
/// Blank input yields an empty string.
pub fn leading_indentation(text: &str) -> &str {
    match text.split('\n').find(|line| !is_blank(line)) {
        Some(line) => {
            let end = line
                .char_indices()
                .find(|(_, c)| *c != ' ' && *c != '\t')
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            &line[..end]
        }
        None => "",
    }
}

/// Returns a copy of `text` shifted right (`amount > 0`) or left (`amount < 0`).
///
/// Indenting leaves blank lines untouched. Dedenting strips at most `|amount|`
/// leading whitespace characters per line and never eats into code.
pub fn shift(text: &str, amount: isize) -> String {
    if amount >= 0 {
        return prefix_lines(text, &" ".repeat(amount.unsigned_abs()));
    }
    text.split('\n')
        .map(|line| {
            let strip = line
                .char_indices()
                .take(amount.unsigned_abs())
                .take_while(|(_, c)| c.is_whitespace())
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            &line[strip..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prepends `prefix` to every non-blank line of `text`.
pub fn prefix_lines(text: &str, prefix: &str) -> String {
    text.split('\n')
        .map(|line| {
            if is_blank(line) || prefix.is_empty() {
                line.to_string()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Moves `text` to column 0 based on the indentation of its first non-blank line.
pub fn dedent(text: &str) -> String {
    let width = leading_indentation(text).chars().count();
    shift(text, -(width as isize))
}
