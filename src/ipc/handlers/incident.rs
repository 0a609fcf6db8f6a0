use std::collections::BTreeMap;

use serde_json::json;

use crate::backend::RegistryBackend;
use crate::ipc::error::{err, ok, validation_failed, verification_unavailable};
use crate::ipc::types::{AppState, Request};
use crate::model::{IncidentDetails, IncidentStudent, Measure, ValidationError};
use crate::store::DraftStore;
use crate::submit::{self, BatchItemOutcome};
use crate::validate;
use crate::wizard::{self, incident_keys as keys, INCIDENT_STEPS, INCIDENT_WIZARD};

fn handle_get<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, INCIDENT_WIZARD);
    let draft = wizard::load_incident(&store);
    ok(
        &req.id,
        json!({
            "currentStep": draft.current_step,
            "formSteps": INCIDENT_STEPS,
            "students": draft.students,
            "measures": draft.measures,
            "details": draft.details,
        }),
    )
}

fn parse_students(params: &serde_json::Value) -> Result<Vec<IncidentStudent>, String> {
    let Some(items) = params.get("students").and_then(|v| v.as_array()) else {
        return Err("missing params.students".to_string());
    };
    let mut students = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(id) = item.get("id").and_then(|v| v.as_i64()) else {
            return Err(format!("students[{}] is missing id", i));
        };
        students.push(IncidentStudent {
            id,
            dni: item.get("dni").and_then(|v| v.as_i64()).unwrap_or_default(),
            first_name: item
                .get("firstName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string(),
            last_name: item
                .get("lastName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string(),
        });
    }
    Ok(students)
}

fn handle_set_students<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let students = match parse_students(&req.params) {
        Ok(students) => students,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };
    let errors = validate::validate_incident_students(&students);
    if !errors.is_empty() {
        // The stored selection is untouched, so an over-full or duplicate
        // request leaves the previous set in place.
        return validation_failed(&req.id, &errors);
    }

    let store = DraftStore::new(conn, INCIDENT_WIZARD);
    let changed = match wizard::save_if_changed(&store, keys::STUDENTS, &students) {
        Ok(changed) => changed,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };

    // Drop measures for students no longer in the selection; every measure
    // key must refer to a selected student.
    let mut measures: BTreeMap<i64, Measure> = store.load(keys::MEASURES).unwrap_or_default();
    let before = measures.len();
    let selected: std::collections::BTreeSet<i64> = students.iter().map(|s| s.id).collect();
    measures.retain(|id, _| selected.contains(id));
    if measures.len() != before {
        if let Err(e) = store.save(keys::MEASURES, Some(&measures)) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    let current: u32 = store.load(keys::CURRENT_STEP).unwrap_or(1);
    let next = wizard::advanced(current, 2);
    if next != current {
        if let Err(e) = store.save(keys::CURRENT_STEP, Some(&next)) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    ok(&req.id, json!({ "changed": changed, "currentStep": next }))
}

fn handle_set_details<B: RegistryBackend>(
    state: &mut AppState<B>,
    req: &Request,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, INCIDENT_WIZARD);
    let students: Vec<IncidentStudent> = store.load(keys::STUDENTS).unwrap_or_default();
    if students.is_empty() {
        return err(
            &req.id,
            "draft_incomplete",
            "select the involved students before entering details",
            None,
        );
    }

    let details = IncidentDetails {
        category_id: req.params.get("categoryId").and_then(|v| v.as_i64()).unwrap_or(0),
        incident_id: req.params.get("incidentId").and_then(|v| v.as_i64()).unwrap_or(0),
        location_id: req.params.get("locationId").and_then(|v| v.as_i64()).unwrap_or(0),
        description: req
            .params
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string(),
    };
    let measures: BTreeMap<i64, Measure> = match req.params.get("measures") {
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(m) => m,
            Err(e) => {
                return err(&req.id, "bad_params", format!("invalid measures payload: {}", e), None)
            }
        },
        None => BTreeMap::new(),
    };
    let measures: BTreeMap<i64, Measure> =
        measures.into_iter().map(|(id, m)| (id, m.normalized())).collect();

    let errors = validate::validate_measures(&students, &measures);
    if !errors.is_empty() {
        return validation_failed(&req.id, &errors);
    }

    let catalog = match state.runtime.block_on(state.backend.incident_catalog()) {
        Ok(catalog) => catalog,
        Err(_) => {
            // The catalog is needed to confirm the category/incident join.
            // Keep the entered details, withhold the advance, let the
            // consumer retry.
            if let Err(e) = wizard::save_if_changed(&store, keys::DETAILS, &details) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            if let Err(e) = wizard::save_if_changed(&store, keys::MEASURES, &measures) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            let lookup = [ValidationError::lookup(
                "incidentId",
                "the incident catalog could not be loaded; please retry",
            )];
            return verification_unavailable(&req.id, &lookup, true);
        }
    };
    let errors = validate::validate_details(&details, &catalog);
    if !errors.is_empty() {
        return validation_failed(&req.id, &errors);
    }

    let details_changed = match wizard::save_if_changed(&store, keys::DETAILS, &details) {
        Ok(changed) => changed,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    let measures_changed = match wizard::save_if_changed(&store, keys::MEASURES, &measures) {
        Ok(changed) => changed,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    let current: u32 = store.load(keys::CURRENT_STEP).unwrap_or(1);
    let next = wizard::advanced(current, 3);
    if next != current {
        if let Err(e) = store.save(keys::CURRENT_STEP, Some(&next)) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    ok(
        &req.id,
        json!({
            "changed": details_changed || measures_changed,
            "currentStep": next,
        }),
    )
}

fn outcome_json(outcome: &BatchItemOutcome) -> serde_json::Value {
    json!({
        "studentId": outcome.student_id,
        "createdId": outcome.created_id,
        "errors": outcome.errors,
    })
}

fn handle_confirm<B: RegistryBackend>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    if state.incident.in_flight {
        return err(
            &req.id,
            "submission_in_flight",
            "an incident submission is already running",
            None,
        );
    }
    let Some(registered_by) = req.params.get("registeredBy").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing params.registeredBy", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, INCIDENT_WIZARD);
    let draft = wizard::load_incident(&store);
    if draft.students.is_empty() {
        return err(&req.id, "draft_incomplete", "no students are selected", None);
    }
    let Some(details) = draft.details else {
        return err(&req.id, "draft_incomplete", "the incident details step has not been completed", None);
    };
    let errors = validate::validate_measures(&draft.students, &draft.measures);
    if !errors.is_empty() {
        return validation_failed(&req.id, &errors);
    }

    // validate_measures guaranteed a measure per student above.
    let entries: Vec<(i64, Measure)> = draft
        .students
        .iter()
        .filter_map(|s| draft.measures.get(&s.id).map(|m| (s.id, *m)))
        .collect();

    state.incident.in_flight = true;
    let instance = state.incident.instance;
    let outcomes = state.runtime.block_on(submit::submit_incident(
        &state.backend,
        &details,
        &entries,
        registered_by,
    ));
    state.incident.in_flight = false;
    let stale = state.incident.instance != instance;

    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    let status = if succeeded == outcomes.len() {
        "completed"
    } else if succeeded == 0 {
        "failed"
    } else {
        "partial"
    };
    log::info!(
        "incident submission: {}/{} students registered",
        succeeded,
        outcomes.len()
    );

    if !stale {
        if status == "completed" {
            if let Err(e) = store.clear(keys::ALL) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
        } else if status == "partial" {
            // Succeeded students are done; keep only the failed ones (and
            // their measures) so the retry never re-creates a record.
            let failed: std::collections::BTreeSet<i64> = outcomes
                .iter()
                .filter(|o| !o.succeeded())
                .map(|o| o.student_id)
                .collect();
            let students: Vec<IncidentStudent> = draft
                .students
                .into_iter()
                .filter(|s| failed.contains(&s.id))
                .collect();
            let measures: BTreeMap<i64, Measure> = draft
                .measures
                .into_iter()
                .filter(|(id, _)| failed.contains(id))
                .collect();
            if let Err(e) = store.save(keys::STUDENTS, Some(&students)) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            if let Err(e) = store.save(keys::MEASURES, Some(&measures)) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
        }
    }

    ok(
        &req.id,
        json!({
            "status": status,
            "completed": status == "completed",
            "outcomes": outcomes.iter().map(outcome_json).collect::<Vec<_>>(),
        }),
    )
}

fn handle_go_to_step<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(step) = req.params.get("step").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing params.step", None);
    };
    if !wizard::step_in_bounds(step, INCIDENT_STEPS) {
        return err(
            &req.id,
            "bad_params",
            format!("step must be between 1 and {}", INCIDENT_STEPS + 1),
            None,
        );
    }
    let step = step as u32;
    let store = DraftStore::new(conn, INCIDENT_WIZARD);
    if let Err(e) = store.save(keys::CURRENT_STEP, Some(&step)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "currentStep": step }))
}

fn handle_reset<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, INCIDENT_WIZARD);
    if let Err(e) = store.clear(keys::ALL) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    state.incident.rotate();
    ok(&req.id, json!({ "currentStep": 1 }))
}

pub fn try_handle<B: RegistryBackend>(
    state: &mut AppState<B>,
    req: &Request,
) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "incident.get" => Some(handle_get(state, req)),
        "incident.setStudents" => Some(handle_set_students(state, req)),
        "incident.setDetails" => Some(handle_set_details(state, req)),
        "incident.confirm" => Some(handle_confirm(state, req)),
        "incident.goToStep" => Some(handle_go_to_step(state, req)),
        "incident.reset" => Some(handle_reset(state, req)),
        _ => None,
    }
}
