use serde::Serialize;
use uuid::Uuid;

use crate::model::{EnrollmentDraft, IncidentDraft};
use crate::store::DraftStore;

pub const ENROLLMENT_WIZARD: &str = "enrollment";
pub const INCIDENT_WIZARD: &str = "incident";

/// Form steps per wizard; step `N + 1` is the complete/summary position.
pub const ENROLLMENT_STEPS: u32 = 2;
pub const INCIDENT_STEPS: u32 = 3;

pub mod enrollment_keys {
    pub const STUDENT: &str = "student";
    pub const GUARDIAN: &str = "guardian";
    pub const CURRENT_STEP: &str = "currentStep";
    pub const ALL: &[&str] = &[STUDENT, GUARDIAN, CURRENT_STEP];
}

pub mod incident_keys {
    pub const STUDENTS: &str = "students";
    pub const MEASURES: &str = "measures";
    pub const DETAILS: &str = "details";
    pub const CURRENT_STEP: &str = "currentStep";
    pub const ALL: &[&str] = &[STUDENTS, MEASURES, DETAILS, CURRENT_STEP];
}

/// Per-wizard runtime state that lives outside the draft store: the
/// instance id ties persisted writes to one wizard run (rotated on reset so
/// a submission resolving late cannot write stale state), and the in-flight
/// flag blocks duplicate concurrent submissions.
pub struct WizardSession {
    pub instance: Uuid,
    pub in_flight: bool,
}

impl WizardSession {
    pub fn new() -> Self {
        Self { instance: Uuid::new_v4(), in_flight: false }
    }

    pub fn rotate(&mut self) {
        self.instance = Uuid::new_v4();
        self.in_flight = false;
    }
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

/// `step` comes straight off the wire, so the bound is checked before any
/// narrowing cast.
pub fn step_in_bounds(step: u64, form_steps: u32) -> bool {
    (1..=u64::from(form_steps) + 1).contains(&step)
}

/// Forward-only advance: revisiting an earlier step and re-submitting it
/// never drags the wizard backwards.
pub fn advanced(current: u32, target: u32) -> u32 {
    current.max(target)
}

/// Persists a slot only when the value actually changed (deep equality on
/// the serialized form). Live-bound form fields re-submit on every
/// keystroke; identical values must not trigger a write.
pub fn save_if_changed<T: Serialize>(
    store: &DraftStore<'_>,
    key: &str,
    value: &T,
) -> anyhow::Result<bool> {
    let next = serde_json::to_value(value)?;
    if store.load_raw(key).as_ref() == Some(&next) {
        return Ok(false);
    }
    store.save(key, Some(&next))?;
    Ok(true)
}

pub fn load_enrollment(store: &DraftStore<'_>) -> EnrollmentDraft {
    EnrollmentDraft {
        student: store.load(enrollment_keys::STUDENT),
        guardian: store.load(enrollment_keys::GUARDIAN),
        current_step: store.load(enrollment_keys::CURRENT_STEP).unwrap_or(1),
    }
}

pub fn load_incident(store: &DraftStore<'_>) -> IncidentDraft {
    IncidentDraft {
        students: store.load(incident_keys::STUDENTS).unwrap_or_default(),
        measures: store.load(incident_keys::MEASURES).unwrap_or_default(),
        details: store.load(incident_keys::DETAILS),
        current_step: store.load(incident_keys::CURRENT_STEP).unwrap_or(1),
    }
}
