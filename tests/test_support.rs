#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use enrolld::backend::{
    BackendError, CompositeEnrollment, CreatedRecord, DniRole, FieldErrors,
    IncidentMeasureRecord, LookupReply, RegistryBackend,
};
use enrolld::ipc::{handle_request, AppState, Request};
use enrolld::model::{CatalogEntry, GuardianDraft, IncidentCatalog, IncidentKind};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// In-memory registry standing in for the school REST backend. Rejections
/// and outages are configured through the public fields; calls made by the
/// orchestrator are recorded so tests can assert ordering and payloads.
pub struct ScriptedBackend {
    pub student_dnis: BTreeSet<i64>,
    /// dni -> active flag
    pub guardian_dnis: BTreeMap<i64, bool>,
    pub employee_dnis: BTreeSet<i64>,
    pub lookups_unavailable: bool,
    pub creation_unavailable: bool,
    pub catalog_unavailable: bool,
    pub catalog: IncidentCatalog,
    pub reject_guardian: Option<FieldErrors>,
    pub reject_composite: Option<FieldErrors>,
    pub reject_measure_for: BTreeSet<i64>,
    pub next_guardian_id: i64,
    pub next_student_id: i64,
    next_measure_id: Cell<i64>,
    pub guardians_created: RefCell<Vec<GuardianDraft>>,
    pub composites_created: RefCell<Vec<CompositeEnrollment>>,
    pub measures_created: RefCell<Vec<IncidentMeasureRecord>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            student_dnis: BTreeSet::new(),
            guardian_dnis: BTreeMap::new(),
            employee_dnis: BTreeSet::new(),
            lookups_unavailable: false,
            creation_unavailable: false,
            catalog_unavailable: false,
            catalog: default_catalog(),
            reject_guardian: None,
            reject_composite: None,
            reject_measure_for: BTreeSet::new(),
            next_guardian_id: 77,
            next_student_id: 501,
            next_measure_id: Cell::new(9000),
            guardians_created: RefCell::new(Vec::new()),
            composites_created: RefCell::new(Vec::new()),
            measures_created: RefCell::new(Vec::new()),
        }
    }
}

pub fn default_catalog() -> IncidentCatalog {
    IncidentCatalog {
        categories: vec![
            CatalogEntry { id: 1, name: "Behaviour".to_string() },
            CatalogEntry { id: 2, name: "Attendance".to_string() },
        ],
        incidents: vec![
            IncidentKind { id: 10, name: "Disrespect".to_string(), category_id: 1 },
            IncidentKind { id: 11, name: "Fighting".to_string(), category_id: 1 },
            IncidentKind { id: 20, name: "Skipping class".to_string(), category_id: 2 },
        ],
        locations: vec![
            CatalogEntry { id: 1, name: "Classroom".to_string() },
            CatalogEntry { id: 2, name: "Playground".to_string() },
        ],
    }
}

impl RegistryBackend for ScriptedBackend {
    async fn check_dni(&self, role: DniRole, dni: i64) -> Result<LookupReply, BackendError> {
        if self.lookups_unavailable {
            return Err(BackendError::Unavailable("registry offline".to_string()));
        }
        Ok(match role {
            DniRole::Student => LookupReply {
                exists: self.student_dnis.contains(&dni),
                active: None,
            },
            DniRole::Guardian => match self.guardian_dnis.get(&dni) {
                Some(active) => LookupReply { exists: true, active: Some(*active) },
                None => LookupReply { exists: false, active: None },
            },
            DniRole::Employee => LookupReply {
                exists: self.employee_dnis.contains(&dni),
                active: None,
            },
        })
    }

    async fn create_guardian(&self, guardian: &GuardianDraft) -> Result<CreatedRecord, BackendError> {
        if self.creation_unavailable {
            return Err(BackendError::Unavailable("registry offline".to_string()));
        }
        if let Some(fields) = &self.reject_guardian {
            return Err(BackendError::Rejected(fields.clone()));
        }
        self.guardians_created.borrow_mut().push(guardian.clone());
        Ok(CreatedRecord { id: self.next_guardian_id })
    }

    async fn create_student_complete(
        &self,
        enrollment: &CompositeEnrollment,
    ) -> Result<CreatedRecord, BackendError> {
        if self.creation_unavailable {
            return Err(BackendError::Unavailable("registry offline".to_string()));
        }
        if let Some(fields) = &self.reject_composite {
            return Err(BackendError::Rejected(fields.clone()));
        }
        self.composites_created.borrow_mut().push(enrollment.clone());
        Ok(CreatedRecord { id: self.next_student_id })
    }

    async fn create_incident_measure(
        &self,
        record: &IncidentMeasureRecord,
    ) -> Result<CreatedRecord, BackendError> {
        if self.reject_measure_for.contains(&record.student_id) {
            let mut fields = FieldErrors::new();
            fields.insert(
                "incidencia".to_string(),
                vec!["the student already has an open measure for this incident".to_string()],
            );
            return Err(BackendError::Rejected(fields));
        }
        self.measures_created.borrow_mut().push(record.clone());
        let id = self.next_measure_id.get();
        self.next_measure_id.set(id + 1);
        Ok(CreatedRecord { id })
    }

    async fn incident_catalog(&self) -> Result<IncidentCatalog, BackendError> {
        if self.catalog_unavailable {
            return Err(BackendError::Unavailable("registry offline".to_string()));
        }
        Ok(self.catalog.clone())
    }
}

pub fn request(
    state: &mut AppState<ScriptedBackend>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    handle_request(
        state,
        Request {
            id: id.to_string(),
            method: method.to_string(),
            params,
        },
    )
}

pub fn request_ok(
    state: &mut AppState<ScriptedBackend>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(state, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Asserts the request was rejected with the given code and returns the
/// error object for detail assertions.
pub fn request_err(
    state: &mut AppState<ScriptedBackend>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    code: &str,
) -> serde_json::Value {
    let value = request(state, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    let error = value.get("error").cloned().expect("error object");
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some(code),
        "unexpected error for {}: {}",
        method,
        error
    );
    error
}

pub fn open_state(workspace: &PathBuf, backend: ScriptedBackend) -> AppState<ScriptedBackend> {
    let mut state = AppState::new(backend).expect("app state");
    let _ = request_ok(
        &mut state,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    state
}

pub fn fresh_state(prefix: &str) -> (AppState<ScriptedBackend>, PathBuf) {
    let workspace = temp_dir(prefix);
    let state = open_state(&workspace, ScriptedBackend::default());
    (state, workspace)
}

pub fn student_params() -> serde_json::Value {
    json!({
        "dni": 30111222,
        "firstName": "Ana",
        "lastName": "Garcia",
        "birthDate": "2012-04-09",
        "gender": "F",
        "notes": "",
        "gradeId": 3,
        "originSchoolId": 9
    })
}

pub fn new_guardian_params() -> serde_json::Value {
    json!({
        "mode": "new",
        "kinshipId": 2,
        "guardian": {
            "dni": 30333444,
            "firstName": "Luis",
            "lastName": "Garcia",
            "gender": "M",
            "phone": "2614123456",
            "email": "Luis@Example.com"
        }
    })
}

pub fn incident_students_params(ids: &[i64]) -> serde_json::Value {
    let students: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "dni": 40000000 + id,
                "firstName": format!("Student{}", id),
                "lastName": "Perez"
            })
        })
        .collect();
    json!({ "students": students })
}

/// Shared details with a warning measure for every listed student.
pub fn incident_details_params(ids: &[i64]) -> serde_json::Value {
    let mut measures = serde_json::Map::new();
    for id in ids {
        measures.insert(id.to_string(), json!({ "kind": "warning", "days": 0 }));
    }
    json!({
        "categoryId": 1,
        "incidentId": 10,
        "locationId": 1,
        "description": "Repeated disruption during class",
        "measures": measures
    })
}
