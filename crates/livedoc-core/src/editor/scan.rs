//! Locate live code fragments in a markdown document.

use serde::Serialize;
use std::fmt;

/// Prefix of an inline code span evaluated as an expression.
pub const INLINE_EXPRESSION_PREFIX: &str = "ldjs:";

/// Prefix of an inline code span rendered as markup.
pub const INLINE_MARKUP_PREFIX: &str = "ldjsx:";

/// Fence language of a statement block.
pub const BLOCK_STATEMENT_LANG: &str = "ldjs";

/// Fence language of a markup block, optionally `ldjsx:<Component>`.
pub const BLOCK_MARKUP_LANG: &str = "ldjsx";

/// Fence language of a component shorthand block, `ldsh:<Component>`.
pub const SHORTHAND_LANG: &str = "ldsh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentKind {
    InlineExpression,
    InlineMarkup,
    BlockStatement,
    BlockMarkup,
}

impl FragmentKind {
    #[must_use]
    pub fn is_inline(self) -> bool {
        matches!(self, Self::InlineExpression | Self::InlineMarkup)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InlineExpression => "inline-expression",
            Self::InlineMarkup => "inline-markup",
            Self::BlockStatement => "block-statement",
            Self::BlockMarkup => "block-markup",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One embedded code unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub kind: FragmentKind,
    /// Byte range: the code span with its backticks, or the block from the
    /// start of the opening fence line to the end of the closing one.
    pub from: usize,
    pub to: usize,
    /// Code without the inline prefix or the fences.
    pub content: String,
    pub shortcut_component: Option<String>,
    pub cursor_inside: bool,
}

impl Fragment {
    /// Range a rendered widget replaces: blocks also take the surrounding
    /// line breaks.
    #[must_use]
    pub fn decoration_range(&self, doc_len: usize) -> (usize, usize) {
        if self.kind.is_inline() {
            (self.from, self.to)
        } else {
            (self.from.saturating_sub(1), (self.to + 1).min(doc_len))
        }
    }
}

struct Line<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

fn lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for raw in text.split_inclusive('\n') {
        let body = raw.strip_suffix('\n').unwrap_or(raw);
        let body = body.strip_suffix('\r').unwrap_or(body);
        out.push(Line {
            start,
            end: start + body.len(),
            text: body,
        });
        start += raw.len();
    }
    out
}

/// Opening fence: marker char, marker length, info string.
fn fence_open(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((marker, len, info))
}

fn fence_closes(line: &str, marker: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= len && trimmed.chars().all(|c| c == marker)
}

/// Kind and shorthand component named by a fence info string.
fn block_kind(info: &str) -> Option<(FragmentKind, Option<String>)> {
    let lang = info.split_whitespace().next()?;
    if lang == BLOCK_STATEMENT_LANG {
        return Some((FragmentKind::BlockStatement, None));
    }
    let (name, component) = match lang.split_once(':') {
        Some((name, component)) => (name, Some(component)),
        None => (lang, None),
    };
    if name != BLOCK_MARKUP_LANG && name != SHORTHAND_LANG {
        return None;
    }
    let component = component.filter(|c| !c.is_empty()).map(str::to_string);
    Some((FragmentKind::BlockMarkup, component))
}

/// Inline code spans on one line: (from, to, inner text), backticks included in the range.
fn code_spans(line: &str) -> Vec<(usize, usize, &str)> {
    let bytes = line.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open = i;
        while i < bytes.len() && bytes[i] == b'`' {
            i += 1;
        }
        let width = i - open;
        let mut j = i;
        let mut close = None;
        while j < bytes.len() {
            if bytes[j] == b'`' {
                let run = j;
                while j < bytes.len() && bytes[j] == b'`' {
                    j += 1;
                }
                if j - run == width {
                    close = Some(run);
                    break;
                }
            } else {
                j += 1;
            }
        }
        if let Some(close) = close {
            spans.push((open, close + width, &line[i..close]));
            i = close + width;
        }
    }
    spans
}

/// Scan `text` for fragments in source order. `cursor` is a byte offset.
#[must_use]
pub fn scan(text: &str, cursor: Option<usize>) -> Vec<Fragment> {
    let lines = lines(text);
    let cursor_line = cursor.map(|offset| {
        text.as_bytes()[..offset.min(text.len())]
            .iter()
            .filter(|b| **b == b'\n')
            .count()
    });
    let mut fragments = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if let Some((marker, len, info)) = fence_open(line.text) {
            let close = (i + 1..lines.len()).find(|&k| fence_closes(lines[k].text, marker, len));
            let Some(close) = close else {
                // Unclosed fences run to the end of the document.
                break;
            };
            if let Some((kind, shortcut_component)) = block_kind(info) {
                let content = lines[i + 1..close]
                    .iter()
                    .map(|l| l.text)
                    .collect::<Vec<_>>()
                    .join("\n");
                fragments.push(Fragment {
                    kind,
                    from: line.start,
                    to: lines[close].end,
                    content,
                    shortcut_component,
                    cursor_inside: cursor_line.is_some_and(|c| (i..=close).contains(&c)),
                });
            }
            i = close + 1;
            continue;
        }

        for (from, to, inner) in code_spans(line.text) {
            let kind = if let Some(code) = inner.strip_prefix(INLINE_EXPRESSION_PREFIX) {
                Some((FragmentKind::InlineExpression, code))
            } else {
                inner
                    .strip_prefix(INLINE_MARKUP_PREFIX)
                    .map(|code| (FragmentKind::InlineMarkup, code))
            };
            if let Some((kind, code)) = kind {
                fragments.push(Fragment {
                    kind,
                    from: line.start + from,
                    to: line.start + to,
                    content: code.to_string(),
                    shortcut_component: None,
                    cursor_inside: cursor_line == Some(i),
                });
            }
        }
        i += 1;
    }
    fragments
}
