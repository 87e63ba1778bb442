// libs/appointment-cell/src/store/mod.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, DailyLimit, NewAppointment, NewPrescription,
    Prescription, UserSummary,
};

pub mod memory;
pub mod supabase;

pub use memory::MemoryRecordStore;
pub use supabase::SupabaseRecordStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The non-cancelled `(doctor, date, time)` uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The write would give the patient more than `limit` counted bookings on `date`.
    #[error("Daily limit of {limit} reached on {date}")]
    DailyLimitReached { limit: usize, date: NaiveDate },

    #[error("Record {0} does not exist")]
    Missing(Uuid),

    #[error("Record store failure: {0}")]
    Backend(String),

    #[error("Malformed record: {0}")]
    Serialization(String),
}

impl From<StoreError> for AppointmentError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UniqueViolation(_) => AppointmentError::Conflict(
                "The selected doctor is not available at the specified date and time.".to_string(),
            ),
            StoreError::DailyLimitReached { limit, date } => {
                AppointmentError::CapacityExceeded { limit, date }
            }
            StoreError::Missing(_) => AppointmentError::NotFound,
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

/// Durable storage for appointments, prescriptions and the user directory.
///
/// Implementations must reject inserts and updates that would leave two
/// non-cancelled appointments on the same `(doctor, date, time)` with
/// [`StoreError::UniqueViolation`], and writes that would push a patient past
/// the [`DailyLimit`] for a date with [`StoreError::DailyLimitReached`]. The
/// scheduler's own checks are only pre-checks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn find_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn count_appointments(&self, filter: &AppointmentFilter) -> Result<usize, StoreError> {
        Ok(self.find_appointments(filter).await?.len())
    }

    /// Assigns `id`, `created_at` and `updated_at`.
    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        limit: &DailyLimit,
    ) -> Result<Appointment, StoreError>;

    /// Writes doctor, date, time and status; refreshes `updated_at`.
    /// `limit` is only checked when the write makes the row newly count
    /// toward its patient's day.
    async fn update_appointment(
        &self,
        appointment: &Appointment,
        limit: &DailyLimit,
    ) -> Result<Appointment, StoreError>;

    async fn insert_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<Prescription, StoreError>;

    async fn latest_prescription(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<Prescription>, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<UserSummary>, StoreError>;

    /// Directory entries with `role`, ordered by name.
    async fn find_users_by_role(&self, role: Role) -> Result<Vec<UserSummary>, StoreError>;
}
