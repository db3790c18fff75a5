//! Property-based tests for the change applier.

use proptest::prelude::*;

use coedit::applier::{apply_changes, ApplyError};
use coedit::models::Change;

fn change(line: usize, column: usize, removed: usize, text: &str) -> Change {
    Change {
        line,
        column,
        removed,
        text: text.to_string(),
    }
}

/// Pick a valid (line, column) anchor in `text` from two free seeds.
fn anchor_in(text: &str, line_seed: usize, column_seed: usize) -> (usize, usize) {
    let lines: Vec<&str> = text.split('\n').collect();
    let line = line_seed % lines.len();
    let column = column_seed % (lines[line].chars().count() + 1);
    (line, column)
}

proptest! {
    #[test]
    fn empty_batch_is_identity(text in "[a-zA-Z0-9 \\n]{0,200}") {
        prop_assert_eq!(apply_changes(&text, &[]).unwrap(), text);
    }

    #[test]
    fn insert_then_remove_roundtrips(
        text in "[a-zA-Z0-9 \\n]{0,100}",
        insert in ".{1,20}",
        line_seed in 0usize..1000,
        column_seed in 0usize..1000,
    ) {
        let (line, column) = anchor_in(&text, line_seed, column_seed);
        let inserted_len = insert.chars().count();

        let inserted = apply_changes(&text, &[change(line, column, 0, &insert)]).unwrap();
        let restored =
            apply_changes(&inserted, &[change(line, column, inserted_len, "")]).unwrap();
        prop_assert_eq!(restored, text);
    }

    #[test]
    fn insert_grows_by_codepoint_count(
        text in "[a-zA-Z0-9 \\n]{0,100}",
        insert in ".{0,20}",
        line_seed in 0usize..1000,
        column_seed in 0usize..1000,
    ) {
        let (line, column) = anchor_in(&text, line_seed, column_seed);
        let out = apply_changes(&text, &[change(line, column, 0, &insert)]).unwrap();
        prop_assert_eq!(
            out.chars().count(),
            text.chars().count() + insert.chars().count()
        );
    }

    #[test]
    fn anchor_past_line_count_always_fails(
        text in "[a-zA-Z0-9 \\n]{0,100}",
        extra in 0usize..10,
    ) {
        let line_count = text.split('\n').count();
        let result = apply_changes(&text, &[change(line_count + extra, 0, 0, "x")]);
        let is_bad_anchor = matches!(result, Err(ApplyError::BadAnchor { .. }));
        prop_assert!(is_bad_anchor);
    }

    #[test]
    fn removal_past_document_always_fails(
        text in "[a-zA-Z0-9 \\n]{0,50}",
        line_seed in 0usize..1000,
        column_seed in 0usize..1000,
    ) {
        let (line, column) = anchor_in(&text, line_seed, column_seed);
        let too_many = text.chars().count() + 1;
        let result = apply_changes(&text, &[change(line, column, too_many, "")]);
        let is_bad_range = matches!(result, Err(ApplyError::BadRange { .. }));
        prop_assert!(is_bad_range);
    }
}
