use std::collections::BTreeMap;

use crate::backend::{DniRole, RegistryBackend};
use crate::model::{
    GuardianDraft, IncidentCatalog, IncidentDetails, IncidentStudent, Measure, MeasureKind,
    StudentDraft, ValidationError, MAX_INCIDENT_STUDENTS, MAX_SUSPENSION_DAYS,
};

pub const RETRY_LOOKUP_MESSAGE: &str =
    "could not verify the DNI against the registry; please retry";

/// Parses and format-checks a DNI from a request value. Accepts a number or
/// a digit string: no other characters, no leading zero, exactly 8 digits.
pub fn parse_dni(field: &str, value: Option<&serde_json::Value>) -> Result<i64, ValidationError> {
    let Some(value) = value else {
        return Err(ValidationError::client(field, "DNI is required"));
    };
    let raw = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(|n| n.to_string())
            .ok_or_else(|| ValidationError::client(field, "DNI must be an integer"))?,
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return Err(ValidationError::client(field, "DNI must be a number or digit string")),
    };
    if raw.is_empty() {
        return Err(ValidationError::client(field, "DNI is required"));
    }
    if !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::client(field, "DNI may only contain digits"));
    }
    if raw.starts_with('0') {
        return Err(ValidationError::client(field, "DNI may not start with 0"));
    }
    if raw.len() != 8 {
        return Err(ValidationError::client(field, "DNI must be exactly 8 digits"));
    }
    raw.parse::<i64>()
        .map_err(|_| ValidationError::client(field, "DNI must be exactly 8 digits"))
}

fn dni_in_range(dni: i64) -> bool {
    (10_000_000..=99_999_999).contains(&dni)
}

fn require_name(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::client(field, "this field is required"));
    }
}

fn require_gender(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value != "M" && value != "F" {
        errors.push(ValidationError::client(field, "gender must be M or F"));
    }
}

pub fn validate_student(student: &StudentDraft) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !dni_in_range(student.dni) {
        errors.push(ValidationError::client("dni", "DNI must be exactly 8 digits"));
    }
    require_name(&mut errors, "firstName", &student.first_name);
    require_name(&mut errors, "lastName", &student.last_name);
    require_gender(&mut errors, "gender", &student.gender);
    match chrono::NaiveDate::parse_from_str(&student.birth_date, "%Y-%m-%d") {
        Ok(date) => {
            if date > chrono::Utc::now().date_naive() {
                errors.push(ValidationError::client(
                    "birthDate",
                    "birth date may not be in the future",
                ));
            }
        }
        Err(_) => errors.push(ValidationError::client(
            "birthDate",
            "birth date must be a valid YYYY-MM-DD date",
        )),
    }
    if student.grade_id <= 0 {
        errors.push(ValidationError::client("gradeId", "a grade must be selected"));
    }
    if student.origin_school_id <= 0 {
        errors.push(ValidationError::client(
            "originSchoolId",
            "an origin school must be selected",
        ));
    }
    errors
}

fn valid_phone(phone: &str) -> bool {
    let digits = phone.trim();
    (6..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

fn valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.contains(char::is_whitespace)
}

/// Step-2 checks for a newly-entered guardian. `student_dni` is the
/// cross-step invariant: a guardian may not reuse the student's DNI.
pub fn validate_guardian(guardian: &GuardianDraft, student_dni: Option<i64>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !dni_in_range(guardian.dni) {
        errors.push(ValidationError::client("dni", "DNI must be exactly 8 digits"));
    } else if student_dni == Some(guardian.dni) {
        errors.push(ValidationError::client(
            "dni",
            "the guardian's DNI must differ from the student's DNI",
        ));
    }
    require_name(&mut errors, "firstName", &guardian.first_name);
    require_name(&mut errors, "lastName", &guardian.last_name);
    require_gender(&mut errors, "gender", &guardian.gender);
    if !valid_phone(&guardian.phone) {
        errors.push(ValidationError::client("phone", "phone must be 6 to 15 digits"));
    }
    if !valid_email(&guardian.email) {
        errors.push(ValidationError::client("email", "email address is not valid"));
    }
    errors
}

pub fn validate_kinship(kinship_id: i64) -> Vec<ValidationError> {
    if kinship_id <= 0 {
        vec![ValidationError::client("kinshipId", "a kinship must be selected")]
    } else {
        Vec::new()
    }
}

pub fn validate_guardian_link(guardian_id: i64, kinship_id: i64) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if guardian_id <= 0 {
        errors.push(ValidationError::client(
            "guardianId",
            "an existing guardian must be selected",
        ));
    }
    errors.extend(validate_kinship(kinship_id));
    errors
}

pub fn validate_incident_students(students: &[IncidentStudent]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if students.is_empty() {
        errors.push(ValidationError::client(
            "students",
            "at least one student must be selected",
        ));
    }
    if students.len() > MAX_INCIDENT_STUDENTS {
        errors.push(ValidationError::client(
            "students",
            format!(
                "at most {} students may be attached to one incident",
                MAX_INCIDENT_STUDENTS
            ),
        ));
    }
    let mut seen = std::collections::BTreeSet::new();
    for student in students {
        if !seen.insert(student.id) {
            errors.push(ValidationError::client(
                "students",
                format!("student {} is selected more than once", student.id),
            ));
        }
    }
    errors
}

/// Per-subject measure invariants: every selected student carries a
/// measure, suspension days stay in `[1, MAX_SUSPENSION_DAYS]`, and no
/// measure refers to an unselected student.
pub fn validate_measures(
    students: &[IncidentStudent],
    measures: &BTreeMap<i64, Measure>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for student in students {
        let field = format!("measures.{}", student.id);
        match measures.get(&student.id) {
            None => errors.push(ValidationError::client(
                &field,
                format!(
                    "{} {}: a measure must be assigned",
                    student.first_name, student.last_name
                ),
            )),
            Some(measure) if measure.kind == MeasureKind::Suspension => {
                if measure.days < 1 || measure.days > MAX_SUSPENSION_DAYS {
                    errors.push(ValidationError::client(
                        &field,
                        format!(
                            "{} {}: suspension days must be between 1 and {}",
                            student.first_name, student.last_name, MAX_SUSPENSION_DAYS
                        ),
                    ));
                }
            }
            Some(_) => {}
        }
    }
    let selected: std::collections::BTreeSet<i64> = students.iter().map(|s| s.id).collect();
    for id in measures.keys() {
        if !selected.contains(id) {
            errors.push(ValidationError::client(
                "measures",
                format!("measure refers to unselected student {}", id),
            ));
        }
    }
    errors
}

pub fn validate_details(details: &IncidentDetails, catalog: &IncidentCatalog) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if details.category_id <= 0 {
        errors.push(ValidationError::client(
            "categoryId",
            "an incident category must be selected",
        ));
    } else if !catalog.categories.iter().any(|c| c.id == details.category_id) {
        errors.push(ValidationError::client("categoryId", "unknown incident category"));
    }
    if details.incident_id <= 0 {
        errors.push(ValidationError::client(
            "incidentId",
            "a specific incident must be selected",
        ));
    } else {
        match catalog.incidents.iter().find(|i| i.id == details.incident_id) {
            None => errors.push(ValidationError::client("incidentId", "unknown incident")),
            Some(kind) if kind.category_id != details.category_id => {
                errors.push(ValidationError::client(
                    "incidentId",
                    "the incident does not belong to the selected category",
                ));
            }
            Some(_) => {}
        }
    }
    if details.location_id <= 0 {
        errors.push(ValidationError::client("locationId", "a location must be selected"));
    } else if !catalog.locations.iter().any(|l| l.id == details.location_id) {
        errors.push(ValidationError::client("locationId", "unknown location"));
    }
    errors
}

/// Registry-side uniqueness checks for a student DNI: it may not already
/// belong to a guardian, a staff member, or another student. A failed call
/// yields a single lookup-origin error and stops; an unverified DNI is
/// never reported as a conflict.
pub async fn verify_student_dni<B: RegistryBackend>(backend: &B, dni: i64) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let checks = [
        (DniRole::Guardian, "this DNI already belongs to a guardian"),
        (DniRole::Employee, "this DNI already belongs to a staff member"),
        (DniRole::Student, "this DNI is already registered to another student"),
    ];
    for (role, message) in checks {
        match backend.check_dni(role, dni).await {
            Ok(reply) if reply.exists => errors.push(ValidationError::client("dni", message)),
            Ok(_) => {}
            Err(_) => {
                errors.push(ValidationError::lookup("dni", RETRY_LOOKUP_MESSAGE));
                break;
            }
        }
    }
    errors
}

/// Guardian-side uniqueness checks. An inactive guardian holding the DNI
/// does not block: re-registering a deactivated guardian is a supported
/// path in the registry.
pub async fn verify_guardian_dni<B: RegistryBackend>(backend: &B, dni: i64) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    match backend.check_dni(DniRole::Student, dni).await {
        Ok(reply) if reply.exists => errors.push(ValidationError::client(
            "dni",
            "this DNI already belongs to a student",
        )),
        Ok(_) => {}
        Err(_) => {
            errors.push(ValidationError::lookup("dni", RETRY_LOOKUP_MESSAGE));
            return errors;
        }
    }
    match backend.check_dni(DniRole::Employee, dni).await {
        Ok(reply) if reply.exists => errors.push(ValidationError::client(
            "dni",
            "this DNI already belongs to a staff member",
        )),
        Ok(_) => {}
        Err(_) => {
            errors.push(ValidationError::lookup("dni", RETRY_LOOKUP_MESSAGE));
            return errors;
        }
    }
    match backend.check_dni(DniRole::Guardian, dni).await {
        Ok(reply) if reply.exists && reply.active.unwrap_or(true) => {
            errors.push(ValidationError::client(
                "dni",
                "this DNI already belongs to an active guardian",
            ));
        }
        Ok(_) => {}
        Err(_) => errors.push(ValidationError::lookup("dni", RETRY_LOOKUP_MESSAGE)),
    }
    errors
}

/// Splits a verification result: confirmed conflicts block outright,
/// lookup failures only withhold the advance.
pub fn split_verification(errors: Vec<ValidationError>) -> (Vec<ValidationError>, Vec<ValidationError>) {
    errors
        .into_iter()
        .partition(|e| e.origin != crate::model::ErrorOrigin::Lookup)
}
