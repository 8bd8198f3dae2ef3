//! Normalisation of heterogeneous run results.

use serde_json::json;

use reportrun_core::{normalize_raw, CanonicalEntry, RawResult, RunOutcome, UNKNOWN_MODEL};

fn mixed() -> Vec<RawResult> {
    vec![
        RawResult::from_value(json!("outputs/a.md")),
        RawResult::from_value(json!(["outputs/b.md", "gpt-4o"])),
        RawResult::from_value(json!({"error": "timeout"})),
        RawResult::from_value(json!(["outputs/c.md", null])),
        RawResult::from_value(json!({"artifact_path": "outputs/d.md", "model": "o1"})),
        RawResult::from_value(json!(42)),
        RawResult::from(&RunOutcome::success("outputs/e.md", Some("claude".into()))),
        RawResult::from(&RunOutcome::failure("rate limited")),
    ]
}

#[test]
fn test_mixed_shapes_collapse_to_canonical_entries() {
    let entries = normalize_raw(mixed());
    assert_eq!(
        entries,
        vec![
            CanonicalEntry::unknown_model("outputs/a.md"),
            CanonicalEntry::new("outputs/b.md", "gpt-4o"),
            CanonicalEntry::unknown_model("outputs/c.md"),
            CanonicalEntry::new("outputs/d.md", "o1"),
            CanonicalEntry::new("outputs/e.md", "claude"),
        ]
    );
    assert_eq!(entries[0].model, UNKNOWN_MODEL);
}

#[test]
fn test_normalisation_is_idempotent() {
    let once = normalize_raw(mixed());
    let twice = normalize_raw(once.clone().into_iter().map(RawResult::from));
    assert_eq!(once, twice);
}

#[test]
fn test_every_entry_has_path_and_model() {
    for entry in normalize_raw(mixed()) {
        assert!(!entry.artifact_path.trim().is_empty());
        assert!(!entry.model.trim().is_empty());
    }
}

#[test]
fn test_empty_input() {
    assert!(normalize_raw(Vec::new()).is_empty());
}
