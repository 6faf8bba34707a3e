use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    audit,
    auth::{
        claims::{Claims, Role},
        extractors::AuthUser,
        guard::{require_owner, require_role},
        handlers::is_valid_email,
    },
    error::ApiError,
    prescriptions::{
        dto::{
            CreatePrescriptionRequest, ListQuery, Pagination, PrescriptionList,
            UpdatePrescriptionRequest,
        },
        repo::{ListFilter, NewPrescription, PageParams, Prescription},
    },
    state::AppState,
};

/// Prescriptions are valid for 30 days from creation.
const VALIDITY_DAYS: i64 = 30;

pub fn prescription_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/prescriptions",
            get(list_prescriptions).post(create_prescription),
        )
        .route(
            "/prescriptions/:id",
            get(get_prescription)
                .put(update_prescription)
                .delete(delete_prescription),
        )
}

fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

#[instrument(skip(state, payload))]
pub async fn create_prescription(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CreatePrescriptionRequest>,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    require_role(&claims, &[Role::Doctor, Role::Admin])?;

    let patient_name = required(&payload.patient_name, "patientName")?;
    let medication = required(&payload.medication, "medication")?;
    let dosage = required(&payload.dosage, "dosage")?;
    let frequency = required(&payload.frequency, "frequency")?;
    let duration = required(&payload.duration, "duration")?;

    let patient_email = payload.patient_email.trim().to_lowercase();
    if !is_valid_email(&patient_email) {
        return Err(ApiError::Validation("patientEmail must be a valid email".into()));
    }

    let prescription = state
        .prescriptions
        .create(NewPrescription {
            doctor_id: claims.sub,
            patient_name,
            patient_email,
            patient_age: payload.patient_age,
            medication,
            dosage,
            frequency,
            duration,
            instructions: payload.instructions.unwrap_or_default(),
            expires_at: OffsetDateTime::now_utc() + TimeDuration::days(VALIDITY_DAYS),
        })
        .await?;

    audit::record(
        state.audit.as_ref(),
        "PRESCRIPTION_CREATED",
        json!({
            "prescription_id": prescription.id,
            "doctor_id": prescription.doctor_id,
            "patient_name": &prescription.patient_name,
            "medication": &prescription.medication,
        }),
    )
    .await;

    info!(prescription_id = %prescription.id, doctor_id = %claims.sub, "prescription created");
    Ok((StatusCode::CREATED, Json(prescription)))
}

#[instrument(skip(state))]
pub async fn list_prescriptions(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PrescriptionList>, ApiError> {
    let filter = match claims.role {
        Role::Doctor => ListFilter::Doctor(claims.sub),
        Role::Patient => ListFilter::Patient {
            email: claims.email.clone(),
        },
        Role::Admin | Role::Pharmacist | Role::Driver => ListFilter::All,
    };

    let page = PageParams {
        page: query.page,
        limit: query.limit,
    }
    .clamped();
    let (data, total) = state.prescriptions.list(filter, query.status, page).await?;

    Ok(Json(PrescriptionList {
        data,
        pagination: Pagination {
            page: page.page,
            limit: page.limit,
            total,
        },
    }))
}

/// Visibility for a single record follows the list filter: a foreign doctor
/// gets a 403, while a patient whose email does not match gets a 404 so the
/// record's existence is not leaked to them.
fn check_visibility(claims: &Claims, prescription: &Prescription) -> Result<(), ApiError> {
    match claims.role {
        Role::Admin | Role::Pharmacist | Role::Driver => Ok(()),
        Role::Doctor => require_owner(claims, prescription.doctor_id),
        Role::Patient => {
            if prescription.patient_email.eq_ignore_ascii_case(&claims.email) {
                Ok(())
            } else {
                Err(ApiError::NotFound("prescription not found".into()))
            }
        }
    }
}

#[instrument(skip(state))]
pub async fn get_prescription(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Prescription>, ApiError> {
    let prescription = state
        .prescriptions
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("prescription not found".into()))?;
    check_visibility(&claims, &prescription)?;
    Ok(Json(prescription))
}

#[instrument(skip(state, payload))]
pub async fn update_prescription(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePrescriptionRequest>,
) -> Result<Json<Prescription>, ApiError> {
    let mut prescription = state
        .prescriptions
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("prescription not found".into()))?;

    require_owner(&claims, prescription.doctor_id)?;

    if prescription.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "prescription is {} and can no longer be modified",
            prescription.status
        )));
    }

    let before = serde_json::to_value(&prescription).unwrap_or_default();

    if let Some(name) = payload.patient_name {
        prescription.patient_name = required(&name, "patientName")?;
    }
    if let Some(email) = payload.patient_email {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ApiError::Validation("patientEmail must be a valid email".into()));
        }
        prescription.patient_email = email;
    }
    if let Some(age) = payload.patient_age {
        prescription.patient_age = Some(age);
    }
    if let Some(medication) = payload.medication {
        prescription.medication = required(&medication, "medication")?;
    }
    if let Some(dosage) = payload.dosage {
        prescription.dosage = required(&dosage, "dosage")?;
    }
    if let Some(frequency) = payload.frequency {
        prescription.frequency = required(&frequency, "frequency")?;
    }
    if let Some(duration) = payload.duration {
        prescription.duration = required(&duration, "duration")?;
    }
    if let Some(instructions) = payload.instructions {
        prescription.instructions = instructions.trim().to_string();
    }
    if let Some(status) = payload.status {
        if status != prescription.status {
            if !prescription.status.can_transition_to(status) {
                return Err(ApiError::InvalidTransition {
                    from: prescription.status,
                    to: status,
                });
            }
            prescription.status = status;
        }
    }

    prescription.updated_at = OffsetDateTime::now_utc();
    state.prescriptions.update(&prescription).await?;

    let after = serde_json::to_value(&prescription).unwrap_or_default();
    audit::record(
        state.audit.as_ref(),
        "PRESCRIPTION_UPDATED",
        json!({
            "prescription_id": prescription.id,
            "actor_id": claims.sub,
            "before": before,
            "after": after,
        }),
    )
    .await;

    info!(prescription_id = %prescription.id, actor_id = %claims.sub, "prescription updated");
    Ok(Json(prescription))
}

#[instrument(skip(state))]
pub async fn delete_prescription(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let prescription = state
        .prescriptions
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("prescription not found".into()))?;

    require_owner(&claims, prescription.doctor_id)?;

    if !state.prescriptions.delete(id).await? {
        // Lost a race with another delete.
        return Err(ApiError::NotFound("prescription not found".into()));
    }

    audit::record(
        state.audit.as_ref(),
        "PRESCRIPTION_DELETED",
        json!({
            "prescription_id": id,
            "actor_id": claims.sub,
            "record": serde_json::to_value(&prescription).unwrap_or_default(),
        }),
    )
    .await;

    info!(prescription_id = %id, actor_id = %claims.sub, "prescription deleted");
    Ok(Json(json!({})))
}
