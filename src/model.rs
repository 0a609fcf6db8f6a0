use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    Client,
    Server,
    Lookup,
}

/// Field-scoped validation failure, returned as data across all layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub origin: ErrorOrigin,
}

impl ValidationError {
    pub fn client(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            origin: ErrorOrigin::Client,
        }
    }

    pub fn server(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            origin: ErrorOrigin::Server,
        }
    }

    pub fn lookup(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            origin: ErrorOrigin::Lookup,
        }
    }
}

/// Missing fields deserialize to their defaults so the validators can
/// report them per-field instead of the whole payload failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDraft {
    #[serde(default)]
    pub dni: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// ISO date, `YYYY-MM-DD`.
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub grade_id: i64,
    #[serde(default)]
    pub origin_school_id: i64,
}

impl StudentDraft {
    pub fn normalized(&self) -> Self {
        Self {
            dni: self.dni,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            birth_date: self.birth_date.trim().to_string(),
            gender: self.gender.trim().to_string(),
            notes: self.notes.trim().to_string(),
            grade_id: self.grade_id,
            origin_school_id: self.origin_school_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianDraft {
    #[serde(default)]
    pub dni: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

impl GuardianDraft {
    /// Normalization applied before the draft is persisted or submitted:
    /// names/phone trimmed, email trimmed and lowercased.
    pub fn normalized(&self) -> Self {
        Self {
            dni: self.dni,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            gender: self.gender.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_ascii_lowercase(),
        }
    }
}

/// Step-2 slot of the enrollment wizard: either link an existing guardian
/// or create a new one. Both carry the kinship used for the join record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum GuardianSlot {
    #[serde(rename_all = "camelCase")]
    New { guardian: GuardianDraft, kinship_id: i64 },
    #[serde(rename_all = "camelCase")]
    Existing { guardian_id: i64, kinship_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDraft {
    pub student: Option<StudentDraft>,
    pub guardian: Option<GuardianSlot>,
    pub current_step: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentStudent {
    pub id: i64,
    pub dni: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    Warning,
    Suspension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub kind: MeasureKind,
    #[serde(default)]
    pub days: u32,
}

impl Measure {
    /// Warnings never carry a day count; the field is forced to zero so a
    /// stale value from a prior suspension selection cannot leak through.
    pub fn normalized(self) -> Self {
        match self.kind {
            MeasureKind::Warning => Self { kind: self.kind, days: 0 },
            MeasureKind::Suspension => self,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDetails {
    pub category_id: i64,
    pub incident_id: i64,
    pub location_id: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDraft {
    pub students: Vec<IncidentStudent>,
    /// Keyed by student id; every key must refer to a selected student.
    pub measures: BTreeMap<i64, Measure>,
    pub details: Option<IncidentDetails>,
    pub current_step: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentKind {
    pub id: i64,
    pub name: String,
    /// Declared foreign key to the incident category. The legacy backend
    /// exposed this under varying names; the backend client normalizes to
    /// this field.
    pub category_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentCatalog {
    pub categories: Vec<CatalogEntry>,
    pub incidents: Vec<IncidentKind>,
    pub locations: Vec<CatalogEntry>,
}

pub const MAX_INCIDENT_STUDENTS: usize = 5;
pub const MAX_SUSPENSION_DAYS: u32 = 30;
