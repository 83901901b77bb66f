//! Lightweight structural checker for generated Python source.
//!
//! Catches the mistakes models make most often before a renderer is spawned:
//! unbalanced brackets, unterminated strings, block headers without a colon
//! and broken indentation. It does not parse expressions.
//!
//! Failures render like the interpreter's own messages (`SyntaxError: ...`,
//! `IndentationError: ...`) so downstream error classification treats them the
//! same way as a real traceback.

use std::fmt;

/// Statements that must carry a top-level `:`
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "class", "try", "except", "finally", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Syntax,
    Indentation,
}

/// First structural problem found in a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub kind: IssueKind,
    pub line: usize,
    pub message: String,
}

impl SyntaxIssue {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Syntax,
            line,
            message: message.into(),
        }
    }

    fn indentation(line: usize, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Indentation,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            IssueKind::Syntax => "SyntaxError",
            IssueKind::Indentation => "IndentationError",
        };
        write!(f, "{}: {} (line {})", prefix, self.message, self.line)
    }
}

impl std::error::Error for SyntaxIssue {}

/// A statement after joining bracket and backslash continuations
#[derive(Debug, Default)]
struct LogicalLine {
    line: usize,
    indent: usize,
    /// Code with comments removed and string literals collapsed to `""`
    code: String,
    top_level_colon: bool,
}

/// Check `source` for structural errors
pub fn check_source(source: &str) -> Result<(), SyntaxIssue> {
    let lines = scan(source)?;
    check_blocks(&lines)
}

pub fn is_valid(source: &str) -> bool {
    check_source(source).is_ok()
}

fn scan(source: &str) -> Result<Vec<LogicalLine>, SyntaxIssue> {
    let chars: Vec<char> = source.chars().collect();
    let n = chars.len();
    let mut i = 0;
    let mut line = 1;
    let mut lines = Vec::new();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut current = LogicalLine::default();
    let mut in_statement = false;

    while i < n {
        if !in_statement {
            let mut indent = 0;
            while i < n && matches!(chars[i], ' ' | '\t' | '\x0c') {
                indent = if chars[i] == '\t' { (indent / 8 + 1) * 8 } else { indent + 1 };
                i += 1;
            }
            if i >= n {
                break;
            }
            match chars[i] {
                '\n' => {
                    line += 1;
                    i += 1;
                    continue;
                }
                '\r' => {
                    i += 1;
                    continue;
                }
                '#' => {
                    while i < n && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                _ => {
                    current = LogicalLine {
                        line,
                        indent,
                        ..LogicalLine::default()
                    };
                    in_statement = true;
                }
            }
        }

        let c = chars[i];
        match c {
            '#' => {
                while i < n && chars[i] != '\n' {
                    i += 1;
                }
            }
            '\\' if matches!(chars.get(i + 1), Some('\n')) => {
                line += 1;
                i += 2;
            }
            '\\' if matches!(chars.get(i + 1), Some('\r')) && matches!(chars.get(i + 2), Some('\n')) => {
                line += 1;
                i += 3;
            }
            '\n' => {
                line += 1;
                i += 1;
                if brackets.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    in_statement = false;
                } else {
                    current.code.push(' ');
                }
            }
            '"' | '\'' => {
                i = skip_string(&chars, i, &mut line)?;
                current.code.push_str("\"\"");
            }
            '(' | '[' | '{' => {
                brackets.push((c, line));
                current.code.push(c);
                i += 1;
            }
            ')' | ']' | '}' => {
                match brackets.pop() {
                    None => return Err(SyntaxIssue::syntax(line, format!("unmatched '{}'", c))),
                    Some((open, _)) if closer(open) != c => {
                        return Err(SyntaxIssue::syntax(
                            line,
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                c, open
                            ),
                        ));
                    }
                    Some(_) => {}
                }
                current.code.push(c);
                i += 1;
            }
            ':' => {
                if brackets.is_empty() {
                    current.top_level_colon = true;
                }
                current.code.push(c);
                i += 1;
            }
            _ => {
                current.code.push(c);
                i += 1;
            }
        }
    }

    if let Some((open, opened_at)) = brackets.first() {
        return Err(SyntaxIssue::syntax(*opened_at, format!("'{}' was never closed", open)));
    }
    if in_statement {
        lines.push(current);
    }
    Ok(lines)
}

/// Skip the string literal starting at `start`; returns the index after it
fn skip_string(chars: &[char], start: usize, line: &mut usize) -> Result<usize, SyntaxIssue> {
    let quote = chars[start];
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);
    let opened_at = *line;
    let mut j = if triple { start + 3 } else { start + 1 };

    while j < chars.len() {
        match chars[j] {
            '\\' => {
                if chars.get(j + 1) == Some(&'\n') {
                    *line += 1;
                }
                j += 2;
            }
            '\n' if !triple => {
                return Err(SyntaxIssue::syntax(opened_at, "unterminated string literal"));
            }
            '\n' => {
                *line += 1;
                j += 1;
            }
            c if c == quote && !triple => return Ok(j + 1),
            c if c == quote
                && chars.get(j + 1) == Some(&quote)
                && chars.get(j + 2) == Some(&quote) =>
            {
                return Ok(j + 3);
            }
            _ => j += 1,
        }
    }

    if triple {
        Err(SyntaxIssue::syntax(opened_at, "unterminated triple-quoted string literal"))
    } else {
        Err(SyntaxIssue::syntax(opened_at, "unterminated string literal"))
    }
}

fn closer(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn leading_keyword(code: &str) -> &str {
    let word = |s: &str| -> usize {
        s.find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(s.len())
    };
    let code = code.trim_start();
    let first = &code[..word(code)];
    if first == "async" {
        let rest = code[first.len()..].trim_start();
        &rest[..word(rest)]
    } else {
        first
    }
}

fn check_blocks(lines: &[LogicalLine]) -> Result<(), SyntaxIssue> {
    let mut indents = vec![0usize];
    let mut pending_header: Option<usize> = None;

    for logical in lines {
        let top = indents.last().copied().unwrap_or(0);

        if let Some(header_line) = pending_header.take() {
            if logical.indent <= top {
                return Err(SyntaxIssue::indentation(
                    logical.line,
                    format!("expected an indented block after line {}", header_line),
                ));
            }
            indents.push(logical.indent);
        } else if logical.indent > top {
            return Err(SyntaxIssue::indentation(logical.line, "unexpected indent"));
        } else if logical.indent < top {
            while indents.last().is_some_and(|&i| i > logical.indent) {
                indents.pop();
            }
            if indents.last() != Some(&logical.indent) {
                return Err(SyntaxIssue::indentation(
                    logical.line,
                    "unindent does not match any outer indentation level",
                ));
            }
        }

        let code = logical.code.trim_end();
        if BLOCK_KEYWORDS.contains(&leading_keyword(code)) && !logical.top_level_colon {
            return Err(SyntaxIssue::syntax(logical.line, "expected ':'"));
        }
        if code.ends_with(':') {
            pending_header = Some(logical.line);
        }
    }

    if let Some(header_line) = pending_header {
        let last = lines.last().map_or(header_line, |l| l.line);
        return Err(SyntaxIssue::indentation(
            last,
            format!("expected an indented block after line {}", header_line),
        ));
    }
    Ok(())
}
