mod test_support;

use serde_json::json;
use test_support::{fresh_state, open_state, request_ok, student_params, ScriptedBackend};

#[test]
fn draft_survives_a_simulated_reload() {
    let (mut state, workspace) = fresh_state("enrolld-draft-roundtrip");

    let set = request_ok(&mut state, "1", "enrollment.setStudent", student_params());
    assert_eq!(set.get("currentStep").and_then(|v| v.as_u64()), Some(2));
    drop(state);

    // A new daemon instance over the same workspace must rehydrate the
    // draft exactly as it was saved.
    let mut state = open_state(&workspace, ScriptedBackend::default());
    let draft = request_ok(&mut state, "2", "enrollment.get", json!({}));
    assert_eq!(draft.get("currentStep").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        draft.pointer("/student/firstName").and_then(|v| v.as_str()),
        Some("Ana")
    );
    assert_eq!(
        draft.pointer("/student/dni").and_then(|v| v.as_i64()),
        Some(30111222)
    );
}

#[test]
fn corrupted_rows_read_as_absent() {
    let (mut state, workspace) = fresh_state("enrolld-draft-corrupt");

    let _ = request_ok(&mut state, "1", "enrollment.setStudent", student_params());
    drop(state);

    let conn = rusqlite::Connection::open(workspace.join("enrolld.sqlite3")).expect("open db");
    conn.execute(
        "UPDATE draft_store SET value = '{not json' WHERE wizard = 'enrollment' AND key = 'student'",
        [],
    )
    .expect("corrupt row");
    drop(conn);

    let mut state = open_state(&workspace, ScriptedBackend::default());
    let draft = request_ok(&mut state, "2", "enrollment.get", json!({}));
    assert!(draft.get("student").map(|v| v.is_null()).unwrap_or(false));
    // Navigation state was stored separately and still loads.
    assert_eq!(draft.get("currentStep").and_then(|v| v.as_u64()), Some(2));
}

#[test]
fn incident_draft_round_trips_measure_map() {
    let (mut state, workspace) = fresh_state("enrolld-incident-roundtrip");

    let _ = request_ok(
        &mut state,
        "1",
        "incident.setStudents",
        test_support::incident_students_params(&[4, 8]),
    );
    let details = json!({
        "categoryId": 1,
        "incidentId": 11,
        "locationId": 2,
        "description": "  shoving in the corridor  ",
        "measures": {
            "4": { "kind": "suspension", "days": 3 },
            "8": { "kind": "warning" }
        }
    });
    let _ = request_ok(&mut state, "2", "incident.setDetails", details);
    drop(state);

    let mut state = open_state(&workspace, ScriptedBackend::default());
    let draft = request_ok(&mut state, "3", "incident.get", json!({}));
    assert_eq!(draft.get("currentStep").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        draft.pointer("/measures/4/kind").and_then(|v| v.as_str()),
        Some("suspension")
    );
    assert_eq!(
        draft.pointer("/measures/4/days").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(
        draft.pointer("/details/description").and_then(|v| v.as_str()),
        Some("shoving in the corridor")
    );
}
