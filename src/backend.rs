use std::collections::BTreeMap;
use std::future::Future;

use crate::model::{
    GuardianDraft, IncidentCatalog, StudentDraft, ValidationError,
};

pub mod http;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DniRole {
    Student,
    Guardian,
    Employee,
}

/// Reply from a uniqueness lookup. "Not found" is a normal reply here; only
/// a failed call is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupReply {
    pub exists: bool,
    pub active: Option<bool>,
}

/// Field-keyed rejection map as returned by the backend on HTTP 400.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub enum BackendError {
    /// The backend understood the request and rejected specific fields.
    Rejected(FieldErrors),
    /// The call itself failed. Says nothing about the data's validity and
    /// must never be conflated with a confirmed conflict.
    Unavailable(String),
}

pub fn rejected_fields(errors: &FieldErrors) -> Vec<ValidationError> {
    let mut out = Vec::new();
    for (field, messages) in errors {
        for message in messages {
            out.push(ValidationError::server(field, message.clone()));
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct CreatedRecord {
    pub id: i64,
}

/// Everything the composite enrollment call needs: the student record plus
/// the grade relation and the guardian relation it materializes.
#[derive(Debug, Clone)]
pub struct CompositeEnrollment {
    pub student: StudentDraft,
    pub guardian_id: i64,
    pub kinship_id: i64,
}

/// One batch item of the incident wizard: shared details flattened together
/// with the subject's own measure.
#[derive(Debug, Clone)]
pub struct IncidentMeasureRecord {
    pub incident_id: i64,
    pub student_id: i64,
    pub registered_by: i64,
    pub location_id: i64,
    pub days: u32,
    pub description: String,
}

/// Client contract for the school registry REST backend. Implementations
/// must report "not found" through [`LookupReply`], reserving errors for
/// calls that actually failed.
pub trait RegistryBackend {
    fn check_dni(
        &self,
        role: DniRole,
        dni: i64,
    ) -> impl Future<Output = Result<LookupReply, BackendError>>;

    fn create_guardian(
        &self,
        guardian: &GuardianDraft,
    ) -> impl Future<Output = Result<CreatedRecord, BackendError>>;

    fn create_student_complete(
        &self,
        enrollment: &CompositeEnrollment,
    ) -> impl Future<Output = Result<CreatedRecord, BackendError>>;

    fn create_incident_measure(
        &self,
        record: &IncidentMeasureRecord,
    ) -> impl Future<Output = Result<CreatedRecord, BackendError>>;

    fn incident_catalog(&self) -> impl Future<Output = Result<IncidentCatalog, BackendError>>;
}
