//! Pure text patching.
//!
//! Changes are anchored at a `(line, column)` position counted in Unicode
//! codepoints (lines split on `\n`); `removed` codepoints are deleted
//! forward from the anchor, across newline boundaries if needed, and the
//! change's text is inserted in their place. Changes in a batch apply in
//! array order, each against the text produced by its predecessors.
//!
//! No side effects, no partial application: the first failing change aborts
//! the whole batch.

use thiserror::Error;

use crate::models::Change;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// The anchor does not exist in the document.
    #[error("anchor out of bounds: line {line}, column {column}")]
    BadAnchor { line: usize, column: usize },

    /// The deletion runs past end-of-document.
    #[error("removal of {removed} codepoints from line {line}, column {column} exceeds document")]
    BadRange {
        line: usize,
        column: usize,
        removed: usize,
    },
}

/// Apply a batch of changes to `text`, returning the patched document.
pub fn apply_changes(text: &str, changes: &[Change]) -> Result<String, ApplyError> {
    let mut current = text.to_string();
    for change in changes {
        current = apply_one(&current, change)?;
    }
    Ok(current)
}

fn apply_one(text: &str, change: &Change) -> Result<String, ApplyError> {
    let lines: Vec<&str> = text.split('\n').collect();
    if change.line >= lines.len() {
        return Err(ApplyError::BadAnchor {
            line: change.line,
            column: change.column,
        });
    }
    let line_len = lines[change.line].chars().count();
    if change.column > line_len {
        return Err(ApplyError::BadAnchor {
            line: change.line,
            column: change.column,
        });
    }

    // Absolute codepoint position of the anchor: each preceding line
    // contributes its length plus the `\n` that terminated it.
    let start: usize = lines[..change.line]
        .iter()
        .map(|l| l.chars().count() + 1)
        .sum::<usize>()
        + change.column;

    let total = text.chars().count();
    let end = start + change.removed;
    if end > total {
        return Err(ApplyError::BadRange {
            line: change.line,
            column: change.column,
            removed: change.removed,
        });
    }

    let mut out = String::with_capacity(text.len() + change.text.len());
    out.extend(text.chars().take(start));
    out.push_str(&change.text);
    out.extend(text.chars().skip(end));
    Ok(out)
}
