use serde::{Deserialize, Serialize};

use crate::prescriptions::repo::Prescription;
use crate::prescriptions::status::PrescriptionStatus;

/// Request body for creating a prescription. Status is never caller-chosen.
/// Fields default so that a missing key surfaces as a validation error
/// rather than a deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePrescriptionRequest {
    pub patient_name: String,
    pub patient_email: String,
    pub patient_age: Option<i32>,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePrescriptionRequest {
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub patient_age: Option<i32>,
    pub medication: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
    pub status: Option<PrescriptionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub status: Option<PrescriptionStatus>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct PrescriptionList {
    pub data: Vec<Prescription>,
    pub pagination: Pagination,
}
