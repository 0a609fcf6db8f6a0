mod test_support;

use serde_json::json;
use test_support::{fresh_state, request_err, request_ok, student_params};

#[test]
fn going_back_keeps_the_later_step_data() {
    let (mut state, _workspace) = fresh_state("enrolld-nav-back");

    let _ = request_ok(&mut state, "1", "enrollment.setStudent", student_params());
    let _ = request_ok(
        &mut state,
        "2",
        "enrollment.setGuardian",
        test_support::new_guardian_params(),
    );

    let moved = request_ok(&mut state, "3", "enrollment.goToStep", json!({ "step": 1 }));
    assert_eq!(moved.get("currentStep").and_then(|v| v.as_u64()), Some(1));

    // Repositioning must not touch either slot.
    let draft = request_ok(&mut state, "4", "enrollment.get", json!({}));
    assert_eq!(
        draft.pointer("/student/firstName").and_then(|v| v.as_str()),
        Some("Ana")
    );
    assert_eq!(
        draft.pointer("/guardian/guardian/dni").and_then(|v| v.as_i64()),
        Some(30333444)
    );
}

#[test]
fn redundant_student_writes_are_suppressed() {
    let (mut state, workspace) = fresh_state("enrolld-nav-redundant");

    let first = request_ok(&mut state, "1", "enrollment.setStudent", student_params());
    assert_eq!(first.get("changed").and_then(|v| v.as_bool()), Some(true));

    let stamp = |workspace: &std::path::Path| -> Option<String> {
        let conn = rusqlite::Connection::open(workspace.join("enrolld.sqlite3")).ok()?;
        conn.query_row(
            "SELECT updated_at FROM draft_store WHERE wizard = 'enrollment' AND key = 'student'",
            [],
            |r| r.get(0),
        )
        .ok()
    };
    let before = stamp(&workspace).expect("student row");

    // Live-bound forms re-send the same value on every keystroke; the
    // second identical call must not persist again.
    let second = request_ok(&mut state, "2", "enrollment.setStudent", student_params());
    assert_eq!(second.get("changed").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(stamp(&workspace).expect("student row"), before);
}

#[test]
fn go_to_step_rejects_out_of_range_targets() {
    let (mut state, _workspace) = fresh_state("enrolld-nav-bounds");

    let _ = request_err(&mut state, "1", "enrollment.goToStep", json!({ "step": 0 }), "bad_params");
    let _ = request_err(&mut state, "2", "enrollment.goToStep", json!({ "step": 4 }), "bad_params");
    let _ = request_err(&mut state, "3", "enrollment.goToStep", json!({}), "bad_params");

    // 3 is the summary/complete position and is still addressable.
    let moved = request_ok(&mut state, "4", "enrollment.goToStep", json!({ "step": 3 }));
    assert_eq!(moved.get("currentStep").and_then(|v| v.as_u64()), Some(3));
}

#[test]
fn reset_clears_every_namespaced_key() {
    let (mut state, workspace) = fresh_state("enrolld-nav-reset");

    let _ = request_ok(&mut state, "1", "enrollment.setStudent", student_params());
    let _ = request_ok(
        &mut state,
        "2",
        "enrollment.setGuardian",
        test_support::new_guardian_params(),
    );

    let reset = request_ok(&mut state, "3", "enrollment.reset", json!({}));
    assert_eq!(reset.get("currentStep").and_then(|v| v.as_u64()), Some(1));

    let conn = rusqlite::Connection::open(workspace.join("enrolld.sqlite3")).expect("open db");
    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM draft_store WHERE wizard = 'enrollment'",
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(rows, 0);

    let draft = request_ok(&mut state, "4", "enrollment.get", json!({}));
    assert_eq!(draft.get("currentStep").and_then(|v| v.as_u64()), Some(1));
    assert!(draft.get("student").map(|v| v.is_null()).unwrap_or(false));
}
