use futures_util::future::join_all;

use crate::backend::{
    rejected_fields, BackendError, CompositeEnrollment, IncidentMeasureRecord, RegistryBackend,
};
use crate::model::{GuardianSlot, IncidentDetails, Measure, StudentDraft, ValidationError};

#[derive(Debug, Clone, Copy)]
pub struct EnrollmentOutcome {
    pub student_id: i64,
    pub guardian_id: i64,
}

#[derive(Debug, Clone)]
pub enum EnrollmentError {
    /// The prerequisite guardian creation was rejected; the composite call
    /// was never attempted.
    GuardianRejected(Vec<ValidationError>),
    /// The guardian exists (created or pre-existing) but the composite
    /// student+relations call was rejected. Carries the guardian id so the
    /// draft can be repointed at the already-created record.
    CompositeRejected {
        guardian_id: i64,
        errors: Vec<ValidationError>,
    },
    Unavailable(String),
}

/// Materializes an enrollment draft: create the guardian first when the
/// slot is `New`, then issue the composite call with the resolved id. A
/// guardian rejection short-circuits.
pub async fn submit_enrollment<B: RegistryBackend>(
    backend: &B,
    student: &StudentDraft,
    guardian: &GuardianSlot,
) -> Result<EnrollmentOutcome, EnrollmentError> {
    let (guardian_id, kinship_id) = match guardian {
        GuardianSlot::Existing { guardian_id, kinship_id } => (*guardian_id, *kinship_id),
        GuardianSlot::New { guardian, kinship_id } => {
            let created = backend.create_guardian(guardian).await.map_err(|e| match e {
                BackendError::Rejected(fields) => {
                    EnrollmentError::GuardianRejected(rejected_fields(&fields))
                }
                BackendError::Unavailable(reason) => EnrollmentError::Unavailable(reason),
            })?;
            (created.id, *kinship_id)
        }
    };

    let composite = CompositeEnrollment {
        student: student.clone(),
        guardian_id,
        kinship_id,
    };
    match backend.create_student_complete(&composite).await {
        Ok(created) => Ok(EnrollmentOutcome { student_id: created.id, guardian_id }),
        Err(BackendError::Rejected(fields)) => Err(EnrollmentError::CompositeRejected {
            guardian_id,
            errors: rejected_fields(&fields),
        }),
        Err(BackendError::Unavailable(reason)) => Err(EnrollmentError::Unavailable(reason)),
    }
}

#[derive(Debug, Clone)]
pub struct BatchItemOutcome {
    pub student_id: i64,
    pub created_id: Option<i64>,
    pub errors: Vec<ValidationError>,
}

impl BatchItemOutcome {
    pub fn succeeded(&self) -> bool {
        self.created_id.is_some()
    }
}

/// Creates one measure record per selected student. The calls are
/// independent: they run concurrently and are all awaited, so one rejection
/// never suppresses the others. The caller gets a per-student outcome list,
/// never a single pass/fail.
pub async fn submit_incident<B: RegistryBackend>(
    backend: &B,
    details: &IncidentDetails,
    entries: &[(i64, Measure)],
    registered_by: i64,
) -> Vec<BatchItemOutcome> {
    let calls = entries.iter().map(|(student_id, measure)| {
        let measure = measure.normalized();
        let record = IncidentMeasureRecord {
            incident_id: details.incident_id,
            student_id: *student_id,
            registered_by,
            location_id: details.location_id,
            days: measure.days,
            description: details.description.trim().to_string(),
        };
        async move {
            match backend.create_incident_measure(&record).await {
                Ok(created) => BatchItemOutcome {
                    student_id: record.student_id,
                    created_id: Some(created.id),
                    errors: Vec::new(),
                },
                Err(BackendError::Rejected(fields)) => BatchItemOutcome {
                    student_id: record.student_id,
                    created_id: None,
                    errors: rejected_fields(&fields),
                },
                Err(BackendError::Unavailable(_)) => BatchItemOutcome {
                    student_id: record.student_id,
                    created_id: None,
                    errors: vec![ValidationError::lookup(
                        "students",
                        "the registry could not be reached; this student was not registered",
                    )],
                },
            }
        }
    });
    join_all(calls).await
}
