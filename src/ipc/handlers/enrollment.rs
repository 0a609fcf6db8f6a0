use serde_json::json;

use crate::backend::RegistryBackend;
use crate::ipc::error::{err, ok, validation_failed, verification_unavailable};
use crate::ipc::types::{AppState, Request};
use crate::model::{GuardianDraft, GuardianSlot, StudentDraft};
use crate::store::DraftStore;
use crate::submit::{self, EnrollmentError};
use crate::validate;
use crate::wizard::{self, enrollment_keys as keys, ENROLLMENT_STEPS, ENROLLMENT_WIZARD};

fn handle_get<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, ENROLLMENT_WIZARD);
    let draft = wizard::load_enrollment(&store);
    ok(
        &req.id,
        json!({
            "currentStep": draft.current_step,
            "formSteps": ENROLLMENT_STEPS,
            "student": draft.student,
            "guardian": draft.guardian,
        }),
    )
}

fn handle_set_student<B: RegistryBackend>(
    state: &mut AppState<B>,
    req: &Request,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if !req.params.is_object() {
        return err(&req.id, "bad_params", "params must be an object", None);
    }
    let dni = match validate::parse_dni("dni", req.params.get("dni")) {
        Ok(dni) => dni,
        Err(e) => return validation_failed(&req.id, &[e]),
    };
    let mut payload = req.params.clone();
    payload["dni"] = json!(dni);
    let student: StudentDraft = match serde_json::from_value(payload) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "bad_params", format!("invalid student payload: {}", e), None),
    };
    let student = student.normalized();

    let errors = validate::validate_student(&student);
    if !errors.is_empty() {
        return validation_failed(&req.id, &errors);
    }
    let verification = state
        .runtime
        .block_on(validate::verify_student_dni(&state.backend, student.dni));
    let (conflicts, lookups) = validate::split_verification(verification);
    if !conflicts.is_empty() {
        return validation_failed(&req.id, &conflicts);
    }

    let store = DraftStore::new(conn, ENROLLMENT_WIZARD);
    if !lookups.is_empty() {
        // Keep what the user typed, but withhold the advance until the
        // registry can confirm the DNI is free.
        if let Err(e) = wizard::save_if_changed(&store, keys::STUDENT, &student) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        return verification_unavailable(&req.id, &lookups, true);
    }

    let changed = match wizard::save_if_changed(&store, keys::STUDENT, &student) {
        Ok(changed) => changed,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    let current: u32 = store.load(keys::CURRENT_STEP).unwrap_or(1);
    let next = wizard::advanced(current, 2);
    if next != current {
        if let Err(e) = store.save(keys::CURRENT_STEP, Some(&next)) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    ok(&req.id, json!({ "changed": changed, "currentStep": next }))
}

fn parse_guardian_slot(
    req: &Request,
    student_dni: i64,
) -> Result<GuardianSlot, serde_json::Value> {
    let kinship_id = req.params.get("kinshipId").and_then(|v| v.as_i64()).unwrap_or(0);
    match req.params.get("mode").and_then(|v| v.as_str()) {
        Some("existing") => {
            let guardian_id = req.params.get("guardianId").and_then(|v| v.as_i64()).unwrap_or(0);
            let errors = validate::validate_guardian_link(guardian_id, kinship_id);
            if !errors.is_empty() {
                return Err(validation_failed(&req.id, &errors));
            }
            Ok(GuardianSlot::Existing { guardian_id, kinship_id })
        }
        Some("new") => {
            let Some(guardian_params) = req.params.get("guardian").filter(|v| v.is_object()) else {
                return Err(err(&req.id, "bad_params", "missing params.guardian", None));
            };
            let dni = match validate::parse_dni("dni", guardian_params.get("dni")) {
                Ok(dni) => dni,
                Err(e) => return Err(validation_failed(&req.id, &[e])),
            };
            let mut payload = guardian_params.clone();
            payload["dni"] = json!(dni);
            let guardian: GuardianDraft = match serde_json::from_value(payload) {
                Ok(g) => g,
                Err(e) => {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        format!("invalid guardian payload: {}", e),
                        None,
                    ))
                }
            };
            let guardian = guardian.normalized();
            let mut errors = validate::validate_guardian(&guardian, Some(student_dni));
            errors.extend(validate::validate_kinship(kinship_id));
            if !errors.is_empty() {
                return Err(validation_failed(&req.id, &errors));
            }
            Ok(GuardianSlot::New { guardian, kinship_id })
        }
        _ => Err(err(&req.id, "bad_params", "mode must be new or existing", None)),
    }
}

fn handle_set_guardian<B: RegistryBackend>(
    state: &mut AppState<B>,
    req: &Request,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, ENROLLMENT_WIZARD);
    let Some(student) = store.load::<StudentDraft>(keys::STUDENT) else {
        return err(
            &req.id,
            "draft_incomplete",
            "complete the student step before assigning a guardian",
            None,
        );
    };
    let slot = match parse_guardian_slot(req, student.dni) {
        Ok(slot) => slot,
        Err(resp) => return resp,
    };

    if let GuardianSlot::New { guardian, .. } = &slot {
        let verification = state
            .runtime
            .block_on(validate::verify_guardian_dni(&state.backend, guardian.dni));
        let (conflicts, lookups) = validate::split_verification(verification);
        if !conflicts.is_empty() {
            return validation_failed(&req.id, &conflicts);
        }
        if !lookups.is_empty() {
            if let Err(e) = wizard::save_if_changed(&store, keys::GUARDIAN, &slot) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            return verification_unavailable(&req.id, &lookups, true);
        }
    }

    let changed = match wizard::save_if_changed(&store, keys::GUARDIAN, &slot) {
        Ok(changed) => changed,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    let current: u32 = store.load(keys::CURRENT_STEP).unwrap_or(1);
    ok(&req.id, json!({ "changed": changed, "currentStep": current }))
}

fn handle_submit<B: RegistryBackend>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    if state.enrollment.in_flight {
        return err(
            &req.id,
            "submission_in_flight",
            "an enrollment submission is already running",
            None,
        );
    }
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, ENROLLMENT_WIZARD);
    let draft = wizard::load_enrollment(&store);
    let Some(student) = draft.student else {
        return err(&req.id, "draft_incomplete", "the student step has not been completed", None);
    };
    let Some(guardian) = draft.guardian else {
        return err(&req.id, "draft_incomplete", "the guardian step has not been completed", None);
    };

    let mut errors = validate::validate_student(&student);
    match &guardian {
        GuardianSlot::New { guardian: g, kinship_id } => {
            errors.extend(validate::validate_guardian(g, Some(student.dni)));
            errors.extend(validate::validate_kinship(*kinship_id));
        }
        GuardianSlot::Existing { guardian_id, kinship_id } => {
            errors.extend(validate::validate_guardian_link(*guardian_id, *kinship_id));
        }
    }
    if !errors.is_empty() {
        return validation_failed(&req.id, &errors);
    }

    state.enrollment.in_flight = true;
    let instance = state.enrollment.instance;
    let result = state
        .runtime
        .block_on(submit::submit_enrollment(&state.backend, &student, &guardian));
    state.enrollment.in_flight = false;
    let stale = state.enrollment.instance != instance;

    match result {
        Ok(outcome) => {
            if !stale {
                if let Err(e) = store.clear(keys::ALL) {
                    return err(&req.id, "db_update_failed", e.to_string(), None);
                }
            }
            log::info!(
                "enrollment completed: student {} guardian {}",
                outcome.student_id,
                outcome.guardian_id
            );
            ok(
                &req.id,
                json!({
                    "completed": true,
                    "studentId": outcome.student_id,
                    "guardianId": outcome.guardian_id,
                }),
            )
        }
        Err(EnrollmentError::GuardianRejected(errors)) => {
            // Dependency abort: the composite call was never attempted and
            // the student slot stays untouched for retry.
            log::warn!("guardian creation rejected; enrollment kept on the guardian step");
            validation_failed(&req.id, &errors)
        }
        Err(EnrollmentError::CompositeRejected { guardian_id, errors }) => {
            if !stale {
                if let GuardianSlot::New { kinship_id, .. } = &guardian {
                    // The guardian record now exists; repoint the slot at it
                    // so a retry links instead of creating a duplicate.
                    let link = GuardianSlot::Existing { guardian_id, kinship_id: *kinship_id };
                    if let Err(e) = wizard::save_if_changed(&store, keys::GUARDIAN, &link) {
                        return err(&req.id, "db_update_failed", e.to_string(), None);
                    }
                }
            }
            validation_failed(&req.id, &errors)
        }
        Err(EnrollmentError::Unavailable(reason)) => {
            log::warn!("enrollment submission could not reach the registry: {}", reason);
            err(
                &req.id,
                "registry_unavailable",
                reason,
                Some(json!({ "retryable": true })),
            )
        }
    }
}

fn handle_go_to_step<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(step) = req.params.get("step").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing params.step", None);
    };
    if !wizard::step_in_bounds(step, ENROLLMENT_STEPS) {
        return err(
            &req.id,
            "bad_params",
            format!("step must be between 1 and {}", ENROLLMENT_STEPS + 1),
            None,
        );
    }
    let step = step as u32;
    let store = DraftStore::new(conn, ENROLLMENT_WIZARD);
    // Repositioning only; step data is left exactly as persisted.
    if let Err(e) = store.save(keys::CURRENT_STEP, Some(&step)) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "currentStep": step }))
}

fn handle_reset<B>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = DraftStore::new(conn, ENROLLMENT_WIZARD);
    if let Err(e) = store.clear(keys::ALL) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    state.enrollment.rotate();
    ok(&req.id, json!({ "currentStep": 1 }))
}

fn handle_verify_dni<B: RegistryBackend>(state: &mut AppState<B>, req: &Request) -> serde_json::Value {
    let dni = match validate::parse_dni("dni", req.params.get("dni")) {
        Ok(dni) => dni,
        Err(e) => return ok(&req.id, json!({ "errors": [e] })),
    };
    let errors = match req.params.get("role").and_then(|v| v.as_str()) {
        Some("student") => state
            .runtime
            .block_on(validate::verify_student_dni(&state.backend, dni)),
        Some("guardian") => state
            .runtime
            .block_on(validate::verify_guardian_dni(&state.backend, dni)),
        _ => return err(&req.id, "bad_params", "role must be student or guardian", None),
    };
    ok(&req.id, json!({ "errors": errors }))
}

pub fn try_handle<B: RegistryBackend>(
    state: &mut AppState<B>,
    req: &Request,
) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollment.get" => Some(handle_get(state, req)),
        "enrollment.setStudent" => Some(handle_set_student(state, req)),
        "enrollment.setGuardian" => Some(handle_set_guardian(state, req)),
        "enrollment.submit" => Some(handle_submit(state, req)),
        "enrollment.goToStep" => Some(handle_go_to_step(state, req)),
        "enrollment.reset" => Some(handle_reset(state, req)),
        "enrollment.verifyDni" => Some(handle_verify_dni(state, req)),
        _ => None,
    }
}
