mod test_support;

use serde_json::json;
use test_support::{fresh_state, incident_details_params, incident_students_params, request, request_ok};

fn first_error_message(error: &serde_json::Value) -> String {
    error
        .pointer("/details/errors/0/message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[test]
fn a_sixth_student_is_rejected_and_the_selection_keeps_five() {
    let (mut state, _workspace) = fresh_state("enrolld-bounds-sixth");

    let set = request_ok(
        &mut state,
        "1",
        "incident.setStudents",
        incident_students_params(&[1, 2, 3, 4, 5]),
    );
    assert_eq!(set.get("currentStep").and_then(|v| v.as_u64()), Some(2));

    let resp = request(
        &mut state,
        "2",
        "incident.setStudents",
        incident_students_params(&[1, 2, 3, 4, 5, 6]),
    );
    let error = resp.get("error").cloned().expect("error");
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("validation_failed"));
    assert!(first_error_message(&error).contains("at most 5"));

    let draft = request_ok(&mut state, "3", "incident.get", json!({}));
    assert_eq!(
        draft.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(5)
    );
}

#[test]
fn empty_and_duplicate_selections_are_rejected() {
    let (mut state, _workspace) = fresh_state("enrolld-bounds-empty-dup");

    let resp = request(&mut state, "1", "incident.setStudents", incident_students_params(&[]));
    let error = resp.get("error").cloned().expect("error");
    assert!(first_error_message(&error).contains("at least one"));

    let resp = request(
        &mut state,
        "2",
        "incident.setStudents",
        incident_students_params(&[7, 7]),
    );
    let error = resp.get("error").cloned().expect("error");
    assert!(first_error_message(&error).contains("more than once"));
}

#[test]
fn shrinking_the_selection_prunes_orphaned_measures() {
    let (mut state, _workspace) = fresh_state("enrolld-bounds-prune");

    let _ = request_ok(
        &mut state,
        "1",
        "incident.setStudents",
        incident_students_params(&[1, 2, 3]),
    );
    let _ = request_ok(
        &mut state,
        "2",
        "incident.setDetails",
        incident_details_params(&[1, 2, 3]),
    );

    // Dropping student 2 must drop its measure as well; every measure key
    // refers to a selected student.
    let _ = request_ok(
        &mut state,
        "3",
        "incident.setStudents",
        incident_students_params(&[1, 3]),
    );
    let draft = request_ok(&mut state, "4", "incident.get", json!({}));
    let measures = draft.get("measures").and_then(|v| v.as_object()).expect("measures");
    assert_eq!(measures.len(), 2);
    assert!(measures.contains_key("1"));
    assert!(measures.contains_key("3"));
}

#[test]
fn details_require_a_selection_first() {
    let (mut state, _workspace) = fresh_state("enrolld-bounds-no-selection");
    let _ = test_support::request_err(
        &mut state,
        "1",
        "incident.setDetails",
        incident_details_params(&[1]),
        "draft_incomplete",
    );
}
