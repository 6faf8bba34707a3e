use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::prescriptions::status::PrescriptionStatus;

/// Prescription record, the system of record for the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_age: Option<i32>,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
    pub status: PrescriptionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub doctor_id: Uuid,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_age: Option<i32>,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
    pub expires_at: OffsetDateTime,
}

/// Role-derived visibility filter applied by the store.
#[derive(Debug, Clone)]
pub enum ListFilter {
    /// Prescribing doctor sees only their own records.
    Doctor(Uuid),
    /// Patients are joined by the email captured at creation time.
    Patient { email: String },
    /// Admin, pharmacist and driver see everything.
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        // page is caller-controlled; saturate instead of overflowing on
        // absurd page numbers.
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn create(&self, new: NewPrescription) -> anyhow::Result<Prescription>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Prescription>>;
    /// Returns the requested page plus the total count under the filter.
    async fn list(
        &self,
        filter: ListFilter,
        status: Option<PrescriptionStatus>,
        page: PageParams,
    ) -> anyhow::Result<(Vec<Prescription>, i64)>;
    /// Writes the full record back; the handler owns field merging and
    /// transition checks. Last write wins on concurrent updates.
    async fn update(&self, prescription: &Prescription) -> anyhow::Result<()>;
    /// Returns false when the id was already gone.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

const PRESCRIPTION_COLUMNS: &str = "id, doctor_id, patient_name, patient_email, patient_age, \
     medication, dosage, frequency, duration, instructions, status, \
     expires_at, created_at, updated_at";

pub struct PgPrescriptionStore {
    pool: PgPool,
}

impl PgPrescriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filter(
        qb: &mut QueryBuilder<'_, Postgres>,
        filter: &ListFilter,
        status: Option<PrescriptionStatus>,
    ) {
        match filter {
            ListFilter::Doctor(id) => {
                qb.push(" AND doctor_id = ").push_bind(*id);
            }
            ListFilter::Patient { email } => {
                qb.push(" AND patient_email = ").push_bind(email.clone());
            }
            ListFilter::All => {}
        }
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status);
        }
    }
}

#[async_trait]
impl PrescriptionStore for PgPrescriptionStore {
    async fn create(&self, new: NewPrescription) -> anyhow::Result<Prescription> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            r#"
            INSERT INTO prescriptions
                (doctor_id, patient_name, patient_email, patient_age,
                 medication, dosage, frequency, duration, instructions, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PRESCRIPTION_COLUMNS}
            "#
        ))
        .bind(new.doctor_id)
        .bind(&new.patient_name)
        .bind(&new.patient_email)
        .bind(new.patient_age)
        .bind(&new.medication)
        .bind(&new.dosage)
        .bind(&new.frequency)
        .bind(&new.duration)
        .bind(&new.instructions)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(prescription)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Prescription>> {
        let prescription = sqlx::query_as::<_, Prescription>(&format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prescription)
    }

    async fn list(
        &self,
        filter: ListFilter,
        status: Option<PrescriptionStatus>,
        page: PageParams,
    ) -> anyhow::Result<(Vec<Prescription>, i64)> {
        let page = page.clamped();

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM prescriptions WHERE TRUE");
        Self::push_filter(&mut count_qb, &filter, status);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE TRUE"
        ));
        Self::push_filter(&mut qb, &filter, status);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = qb
            .build_query_as::<Prescription>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    async fn update(&self, prescription: &Prescription) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE prescriptions
            SET patient_name = $2, patient_email = $3, patient_age = $4,
                medication = $5, dosage = $6, frequency = $7, duration = $8,
                instructions = $9, status = $10, expires_at = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(prescription.id)
        .bind(&prescription.patient_name)
        .bind(&prescription.patient_email)
        .bind(prescription.patient_age)
        .bind(&prescription.medication)
        .bind(&prescription.dosage)
        .bind(&prescription.frequency)
        .bind(&prescription.duration)
        .bind(&prescription.instructions)
        .bind(prescription.status)
        .bind(prescription.expires_at)
        .bind(prescription.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM prescriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// In-memory store backing demo mode and the test suite.
#[derive(Default)]
pub struct MemoryPrescriptionStore {
    records: RwLock<HashMap<Uuid, Prescription>>,
}

impl MemoryPrescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(p: &Prescription, filter: &ListFilter, status: Option<PrescriptionStatus>) -> bool {
        let filter_ok = match filter {
            ListFilter::Doctor(id) => p.doctor_id == *id,
            ListFilter::Patient { email } => p.patient_email.eq_ignore_ascii_case(email),
            ListFilter::All => true,
        };
        filter_ok && status.map_or(true, |s| p.status == s)
    }
}

#[async_trait]
impl PrescriptionStore for MemoryPrescriptionStore {
    async fn create(&self, new: NewPrescription) -> anyhow::Result<Prescription> {
        let now = OffsetDateTime::now_utc();
        let prescription = Prescription {
            id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            patient_name: new.patient_name,
            patient_email: new.patient_email,
            patient_age: new.patient_age,
            medication: new.medication,
            dosage: new.dosage,
            frequency: new.frequency,
            duration: new.duration,
            instructions: new.instructions,
            status: PrescriptionStatus::Pending,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };
        self.records
            .write()
            .await
            .insert(prescription.id, prescription.clone());
        Ok(prescription)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Prescription>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: ListFilter,
        status: Option<PrescriptionStatus>,
        page: PageParams,
    ) -> anyhow::Result<(Vec<Prescription>, i64)> {
        let page = page.clamped();
        let records = self.records.read().await;
        let mut rows: Vec<Prescription> = records
            .values()
            .filter(|p| Self::matches(p, &filter, status))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok((rows, total))
    }

    async fn update(&self, prescription: &Prescription) -> anyhow::Result<()> {
        self.records
            .write()
            .await
            .insert(prescription.id, prescription.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.records.write().await.remove(&id).is_some())
    }
}
