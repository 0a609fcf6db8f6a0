use serde_json::{json, Value};

use crate::model::{CatalogEntry, GuardianDraft, IncidentCatalog, IncidentKind};

use super::{
    BackendError, CompositeEnrollment, CreatedRecord, DniRole, FieldErrors,
    IncidentMeasureRecord, LookupReply, RegistryBackend,
};

/// reqwest client for the school registry REST API. Routes and response
/// shapes follow the secretaría/preceptoría backend; a 404 on the verify
/// routes means "not registered", every other failure is `Unavailable`.
pub struct HttpRegistry {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var("ENROLLD_API_URL")
            .unwrap_or_else(|_| "http://localhost:8000/api".to_string());
        let token = std::env::var("ENROLLD_API_TOKEN").ok();
        Self::new(base_url, token)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        let resp = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "GET {} returned {}",
                path, status
            )));
        }
        resp.json()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    async fn post_created(&self, path: &str, body: Value) -> Result<CreatedRecord, BackendError> {
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let body: Value = resp
                .json()
                .await
                .map_err(|e| BackendError::Unavailable(e.to_string()))?;
            return Err(BackendError::Rejected(parse_field_errors(&body)));
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "POST {} returned {}",
                path, status
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let id = created_id(&body).ok_or_else(|| {
            BackendError::Unavailable(format!("POST {} returned no record id", path))
        })?;
        Ok(CreatedRecord { id })
    }
}

/// The backend returns `{ field: ["msg", ...], ... }` on 400; some routes
/// wrap single messages as plain strings.
fn parse_field_errors(body: &Value) -> FieldErrors {
    let mut out = FieldErrors::new();
    if let Some(obj) = body.as_object() {
        for (field, value) in obj {
            let messages = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect(),
                _ => continue,
            };
            if !messages.is_empty() {
                out.insert(field.clone(), messages);
            }
        }
    }
    if out.is_empty() {
        out.insert(
            "_".to_string(),
            vec!["the registry rejected the request".to_string()],
        );
    }
    out
}

fn created_id(body: &Value) -> Option<i64> {
    for key in ["id_tutor", "id_alumno", "id_medida", "id"] {
        if let Some(id) = body.get(key).and_then(|v| v.as_i64()) {
            return Some(id);
        }
    }
    // Creation replies sometimes nest the record under a named key.
    body.as_object()?
        .values()
        .find_map(|v| v.as_object().and_then(|o| o.get("id").and_then(|v| v.as_i64())))
}

fn catalog_entry(value: &Value, id_key: &str, name_key: &str) -> Option<CatalogEntry> {
    Some(CatalogEntry {
        id: value.get(id_key).and_then(|v| v.as_i64())?,
        name: value.get(name_key).and_then(|v| v.as_str())?.to_string(),
    })
}

impl RegistryBackend for HttpRegistry {
    async fn check_dni(&self, role: DniRole, dni: i64) -> Result<LookupReply, BackendError> {
        let path = match role {
            DniRole::Student => format!("/secretarios/alumnos/verificar-dni/{}/", dni),
            DniRole::Guardian => format!("/secretarios/tutores/verificar-dni/{}/", dni),
            DniRole::Employee => format!("/secretarios/empleados/verificar-dni/{}/", dni),
        };
        let resp = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(LookupReply { exists: false, active: None });
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "GET {} returned {}",
                path, status
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(LookupReply {
            exists: body.get("existe").and_then(|v| v.as_bool()).unwrap_or(false),
            active: body.get("activo").and_then(|v| v.as_bool()),
        })
    }

    async fn create_guardian(&self, guardian: &GuardianDraft) -> Result<CreatedRecord, BackendError> {
        let g = guardian.normalized();
        self.post_created(
            "/secretarios/tutores/crear/",
            json!({
                "dni_tutor": g.dni,
                "nombre_tutor": g.first_name,
                "apellido_tutor": g.last_name,
                "genero_tutor": g.gender,
                "telefono_tutor": g.phone,
                "correo_tutor": g.email,
                "estado_tutor": "Activo",
                "primer_login": true,
            }),
        )
        .await
    }

    async fn create_student_complete(
        &self,
        enrollment: &CompositeEnrollment,
    ) -> Result<CreatedRecord, BackendError> {
        let s = &enrollment.student;
        self.post_created(
            "/secretarios/alumno-completo/",
            json!({
                "alumno": {
                    "nombre_alumno": s.first_name,
                    "apellido_alumno": s.last_name,
                    "dni_alumno": s.dni,
                    "fecha_nacimiento_alumno": s.birth_date,
                    "genero_alumno": s.gender,
                    "observaciones_alumno": s.notes,
                    "estado_alumno": "Activo",
                },
                "relacionGrado": {
                    "id_grado": s.grade_id,
                    "id_colegio_procedencia": s.origin_school_id,
                },
                "relacionTutor": {
                    "id_tutor": enrollment.guardian_id,
                    "id_parentesco": enrollment.kinship_id,
                },
            }),
        )
        .await
    }

    async fn create_incident_measure(
        &self,
        record: &IncidentMeasureRecord,
    ) -> Result<CreatedRecord, BackendError> {
        self.post_created(
            "/preceptores_rectores/medidas/",
            json!({
                "incidencia": record.incident_id,
                "id_alumno": record.student_id,
                "id_empleado": record.registered_by,
                "id_lugar": record.location_id,
                "cantidad_dias": record.days,
                "descripcion_caso": record.description,
            }),
        )
        .await
    }

    async fn incident_catalog(&self) -> Result<IncidentCatalog, BackendError> {
        let categories = self.get_json("/preceptores_rectores/tipos-incidencias/").await?;
        let incidents = self.get_json("/preceptores_rectores/incidencias/").await?;
        let locations = self.get_json("/preceptores_rectores/lugares/").await?;

        let categories = categories
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| catalog_entry(v, "id_tipo_incidencia", "tipo_incidencia_nombre"))
                    .collect()
            })
            .unwrap_or_default();
        let locations = locations
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| catalog_entry(v, "id_lugar", "nombre_lugar"))
                    .collect()
            })
            .unwrap_or_default();
        let incidents = incidents
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| {
                        // The category key is declared here, not discovered by
                        // scanning field names at runtime; both historical
                        // spellings of it are accepted.
                        let category_id = v
                            .get("id_tipo_incidencia")
                            .or_else(|| v.get("tipo_incidencia"))
                            .and_then(|c| c.as_i64())?;
                        Some(IncidentKind {
                            id: v.get("id_incidencia").and_then(|v| v.as_i64())?,
                            name: v
                                .get("nombre_incidencia")
                                .and_then(|v| v.as_str())?
                                .to_string(),
                            category_id,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(IncidentCatalog { categories, incidents, locations })
    }
}
