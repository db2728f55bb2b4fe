//! Span-based text edits over generated code.

/// Replace `source[start..end]` with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Edit {
    pub fn replace(start: u32, end: u32, text: impl Into<String>) -> Self {
        Self {
            start: start as usize,
            end: end as usize,
            text: text.into(),
        }
    }
}

/// Apply non-overlapping edits. Edits overlapping an earlier one are dropped.
pub(crate) fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    if edits.is_empty() {
        return source.to_string();
    }
    edits.sort_by_key(|e| (e.start, e.end));

    let mut out = String::with_capacity(source.len() + edits.len() * 48);
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor || edit.end > source.len() {
            continue;
        }
        out.push_str(&source[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sorted_and_unsorted() {
        let source = "a + b + c";
        let edits = vec![Edit::replace(8, 9, "C"), Edit::replace(0, 1, "A")];
        assert_eq!(apply(source, edits), "A + b + C");
    }

    #[test]
    fn test_apply_skips_overlap() {
        let source = "abcdef";
        let edits = vec![Edit::replace(0, 3, "X"), Edit::replace(2, 4, "Y")];
        assert_eq!(apply(source, edits), "Xdef");
    }
}
