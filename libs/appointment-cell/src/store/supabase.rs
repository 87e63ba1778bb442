// libs/appointment-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{DatabaseError, SupabaseClient};
use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentFilter, AppointmentStatus, DailyLimit, NewAppointment, NewPrescription,
    Prescription, UserSummary,
};

const USER_COLUMNS: &str = "id,name,email,role,specialization";
use crate::store::{RecordStore, StoreError};

impl From<DatabaseError> for StoreError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::UniqueViolation(msg) => StoreError::UniqueViolation(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// PostgREST-backed record store. The `appointments` table is expected to
/// carry a partial unique index on `(doctor_id, date, time)` where
/// `status <> 'Cancelled'`; its violations come back as
/// [`StoreError::UniqueViolation`].
///
/// The daily limit is enforced by a `BEFORE INSERT OR UPDATE` trigger on the
/// same table. It takes a per-patient advisory lock on `(patient_id, date)`,
/// counts the patient's other rows that day (skipping `Cancelled` ones unless
/// cancelled bookings count) and raises `check_violation` (`23514`) when the
/// row would newly count past the configured maximum. Such rejections come
/// back as [`StoreError::DailyLimitReached`]. The trigger's maximum must
/// match `MAX_APPOINTMENTS_PER_DAY`.
pub struct SupabaseRecordStore {
    supabase: Arc<SupabaseClient>,
    service_token: Option<String>,
}

impl SupabaseRecordStore {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        debug!("Record store bound to {}", supabase.get_base_url());

        Self {
            supabase,
            service_token: config.supabase_service_token.clone(),
        }
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            self.service_token.as_deref(),
            None,
        ).await?;

        parse_rows(rows)
    }

    async fn write_row<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> Result<Option<T>, StoreError> {
        let rows: Vec<Value> = self.supabase.request(
            method,
            path,
            self.service_token.as_deref(),
            Some(body),
        ).await?;

        Ok(parse_rows(rows)?.into_iter().next())
    }

    async fn write_appointment(
        &self,
        method: Method,
        path: &str,
        body: Value,
        limit: &DailyLimit,
        date: NaiveDate,
    ) -> Result<Option<Appointment>, StoreError> {
        let rows: Vec<Value> = self.supabase.request(
            method,
            path,
            self.service_token.as_deref(),
            Some(body),
        ).await.map_err(|e| match e {
            DatabaseError::CheckViolation(msg) => {
                debug!("Daily limit trigger rejected write on {}: {}", date, msg);
                StoreError::DailyLimitReached { limit: limit.max_per_day, date }
            }
            other => StoreError::from(other),
        })?;

        Ok(parse_rows(rows)?.into_iter().next())
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn filter_query(filter: &AppointmentFilter) -> Vec<String> {
    let mut query_parts = Vec::new();

    if let Some(patient_id) = filter.patient_id {
        query_parts.push(format!("patient_id=eq.{}", patient_id));
    }
    if let Some(doctor_id) = filter.doctor_id {
        query_parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if let Some(date) = filter.date {
        query_parts.push(format!("date=eq.{}", date));
    }
    if let Some(time) = &filter.time {
        query_parts.push(format!("time=eq.{}", urlencoding::encode(time)));
    }
    if let Some(exclude_id) = filter.exclude_id {
        query_parts.push(format!("id=neq.{}", exclude_id));
    }
    if filter.active_only {
        query_parts.push(format!("status=neq.{}", AppointmentStatus::Cancelled));
    }

    query_parts
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        Ok(self.fetch_rows(&path).await?.into_iter().next())
    }

    async fn find_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = filter_query(filter);
        query_parts.push("order=created_at.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        debug!("Querying appointments: {}", path);
        self.fetch_rows(&path).await
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        limit: &DailyLimit,
    ) -> Result<Appointment, StoreError> {
        let body = json!({
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "date": appointment.date,
            "time": appointment.time,
            "status": appointment.status,
        });

        self.write_appointment(Method::POST, "/rest/v1/appointments", body, limit, appointment.date)
            .await?
            .ok_or_else(|| StoreError::Backend("Insert returned no appointment row".to_string()))
    }

    async fn update_appointment(
        &self,
        appointment: &Appointment,
        limit: &DailyLimit,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "doctor_id": appointment.doctor_id,
            "date": appointment.date,
            "time": appointment.time,
            "status": appointment.status,
            "updated_at": Utc::now(),
        });

        self.write_appointment(Method::PATCH, &path, body, limit, appointment.date)
            .await?
            .ok_or(StoreError::Missing(appointment.id))
    }

    async fn insert_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<Prescription, StoreError> {
        let body = serde_json::to_value(&prescription)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.write_row(Method::POST, "/rest/v1/prescriptions", body)
            .await?
            .ok_or_else(|| StoreError::Backend("Insert returned no prescription row".to_string()))
    }

    async fn latest_prescription(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<Prescription>, StoreError> {
        let path = format!(
            "/rest/v1/prescriptions?patient_id=eq.{}&doctor_id=eq.{}&order=date.desc&limit=1",
            patient_id, doctor_id
        );
        Ok(self.fetch_rows(&path).await?.into_iter().next())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserSummary>, StoreError> {
        let path = format!("/rest/v1/users?id=eq.{}&select={}", id, USER_COLUMNS);
        Ok(self.fetch_rows(&path).await?.into_iter().next())
    }

    async fn find_users_by_role(&self, role: Role) -> Result<Vec<UserSummary>, StoreError> {
        // Directory rows store the role in either case.
        let path = format!(
            "/rest/v1/users?role=ilike.{}&select={}&order=name.asc",
            role, USER_COLUMNS
        );
        self.fetch_rows(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn slot_filter_builds_postgrest_query() {
        let doctor = Uuid::new_v4();
        let excluded = Uuid::new_v4();
        let filter = AppointmentFilter {
            doctor_id: Some(doctor),
            date: NaiveDate::from_ymd_opt(2024, 6, 15),
            time: Some("10:00 AM".to_string()),
            ..AppointmentFilter::default()
        }
        .excluding(Some(excluded))
        .active_only();

        assert_eq!(
            filter_query(&filter),
            vec![
                format!("doctor_id=eq.{}", doctor),
                "date=eq.2024-06-15".to_string(),
                "time=eq.10%3A00%20AM".to_string(),
                format!("id=neq.{}", excluded),
                "status=neq.Cancelled".to_string(),
            ]
        );
    }

    #[test]
    fn unique_violation_survives_the_error_conversion() {
        let err: StoreError = DatabaseError::UniqueViolation("dup".to_string()).into();
        assert_eq!(err, StoreError::UniqueViolation("dup".to_string()));
    }
}
