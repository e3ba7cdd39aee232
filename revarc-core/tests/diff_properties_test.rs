//! Property tests for the diff script codec

use proptest::prelude::*;
use revarc_core::diff::{diff, split_lines};
use revarc_core::{EditOp, Script};

/// Lines drawn from a small alphabet so that texts share plenty of lines
fn lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(vec!["", "a", "b", "c", "a b", "\r", "{{code}}"]),
        0..24,
    )
    .prop_map(|v| v.into_iter().map(str::to_string).collect())
}

proptest! {
    #[test]
    fn prop_apply_diff_roundtrip(a in lines(), b in lines()) {
        let script = diff(&a, &b);
        prop_assert_eq!(script.apply(&a).unwrap(), b);
    }

    #[test]
    fn prop_encoded_script_roundtrip(a in lines(), b in lines()) {
        let script = diff(&a, &b);
        let decoded = Script::decode(&script.encode()).unwrap();
        prop_assert_eq!(decoded.apply(&a).unwrap(), b);
    }

    #[test]
    fn prop_identity_is_empty(a in lines()) {
        prop_assert!(diff(&a, &a).is_empty());
        prop_assert_eq!(Script::new().apply(&a).unwrap(), a);
    }

    #[test]
    fn prop_text_roundtrip(a in "[ab\n\r]{0,40}", b in "[ab\n\r]{0,40}") {
        let script = revarc_core::diff::diff_text(&a, &b);
        prop_assert_eq!(script.apply_text(&a).unwrap(), b);
    }

    #[test]
    fn prop_ops_are_ordered(a in lines(), b in lines()) {
        let script = diff(&a, &b);
        let mut consumed = 0usize;
        for op in script.ops() {
            prop_assert!(op.count() > 0);
            match op {
                EditOp::Delete { .. } => {
                    prop_assert!(op.position() > consumed);
                    consumed = op.position() - 1 + op.count();
                }
                EditOp::Add { .. } => {
                    prop_assert!(op.position() >= consumed);
                    consumed = op.position();
                }
            }
        }
        prop_assert!(consumed <= a.len());
    }
}

#[test]
fn test_replace_middle_line() {
    let script = diff(&["A", "B", "C"], &["A", "X", "C"]);
    assert_eq!(
        script.ops(),
        &[
            EditOp::Delete { position: 2, count: 1 },
            EditOp::Add {
                position: 2,
                lines: vec!["X".to_string()]
            },
        ]
    );
}

#[test]
fn test_trailing_newline_survives() {
    let script = revarc_core::diff::diff_text("a\nb", "a\nb\n");
    assert_eq!(script.apply_text("a\nb").unwrap(), "a\nb\n");
    assert_eq!(split_lines("a\nb\n"), vec!["a", "b", ""]);
}

#[test]
fn test_hand_built_script() {
    let script = Script::from_ops(vec![
        EditOp::Delete { position: 1, count: 1 },
        EditOp::Add {
            position: 3,
            lines: vec!["end".to_string()],
        },
    ]);
    assert_eq!(script.encode(), "d1 1\na3 1\nend\n");
    assert_eq!(
        script.apply(&["a", "b", "c"]).unwrap(),
        vec!["b".to_string(), "c".to_string(), "end".to_string()]
    );
    assert!(script.apply(&["a"]).is_err());
}
