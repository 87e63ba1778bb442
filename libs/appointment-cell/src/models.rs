// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Role;
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot(&self) -> Slot {
        Slot {
            doctor_id: self.doctor_id,
            date: self.date,
            time: self.time.clone(),
        }
    }

    /// Cancelled rows release their slot; every other status holds it.
    pub fn is_active(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }
}

/// The `(doctor, date, time)` triple that must be unique among active bookings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doctor {} on {} at {}", self.doctor_id, self.date, self.time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    pub status: AppointmentStatus,
}

impl NewAppointment {
    pub fn slot(&self) -> Slot {
        Slot {
            doctor_id: self.doctor_id,
            date: self.date,
            time: self.time.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "confirmed")]
    Confirmed,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "cancelled")]
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "Pending"),
            AppointmentStatus::Confirmed => write!(f, "Confirmed"),
            AppointmentStatus::Completed => write!(f, "Completed"),
            AppointmentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| AppointmentError::ValidationError(format!("Invalid status value: {}", value)))
    }
}

// ==============================================================================
// POPULATED VIEWS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub specialization: Option<String>,
}

/// An appointment with its patient and doctor summaries filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Option<UserSummary>,
    pub doctor: Option<UserSummary>,
}

impl AppointmentDetails {
    pub fn id(&self) -> Uuid {
        self.appointment.id
    }

    pub fn status(&self) -> AppointmentStatus {
        self.appointment.status
    }
}

/// Specialization catalogue entry offered when doctors register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Specialization {
    pub id: &'static str,
    pub name: &'static str,
}

pub const UNSPECIFIED_SPECIALIZATION: &str = "Not Specified";

pub const SPECIALIZATIONS: &[Specialization] = &[
    Specialization { id: "general-practice", name: "General Practice" },
    Specialization { id: "cardiology", name: "Cardiology" },
    Specialization { id: "dermatology", name: "Dermatology" },
    Specialization { id: "endocrinology", name: "Endocrinology" },
    Specialization { id: "gastroenterology", name: "Gastroenterology" },
    Specialization { id: "neurology", name: "Neurology" },
    Specialization { id: "obstetrics-gynecology", name: "Obstetrics and Gynecology" },
    Specialization { id: "oncology", name: "Oncology" },
    Specialization { id: "ophthalmology", name: "Ophthalmology" },
    Specialization { id: "orthopedics", name: "Orthopedics" },
    Specialization { id: "pediatrics", name: "Pediatrics" },
    Specialization { id: "psychiatry", name: "Psychiatry" },
    Specialization { id: "pulmonology", name: "Pulmonology" },
    Specialization { id: "urology", name: "Urology" },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medicines: Vec<String>,
    pub diagnosis: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medicines: Vec<String>,
    pub diagnosis: String,
    pub date: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_doctor_id: Option<Uuid>,
    pub new_date: Option<NaiveDate>,
    pub new_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescribeRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medicines: Vec<String>,
    pub diagnosis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentsByDateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionQuery {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
}

// ==============================================================================
// QUERY MODELS
// ==============================================================================

/// Record store query. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub exclude_id: Option<Uuid>,
    pub active_only: bool,
}

impl AppointmentFilter {
    pub fn for_slot(slot: &Slot) -> Self {
        Self {
            doctor_id: Some(slot.doctor_id),
            date: Some(slot.date),
            time: Some(slot.time.clone()),
            ..Self::default()
        }
    }

    pub fn for_patient_on(patient_id: Uuid, date: NaiveDate) -> Self {
        Self {
            patient_id: Some(patient_id),
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn with_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn with_doctor(mut self, doctor_id: Uuid) -> Self {
        self.doctor_id = Some(doctor_id);
        self
    }

    pub fn excluding(mut self, appointment_id: Option<Uuid>) -> Self {
        self.exclude_id = appointment_id;
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.date.map_or(true, |date| appointment.date == date)
            && self.time.as_ref().map_or(true, |time| &appointment.time == time)
            && self.exclude_id.map_or(true, |id| appointment.id != id)
            && (!self.active_only || appointment.is_active())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub doctor_slot_taken: bool,
    pub duplicate_booking: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("You cannot book more than {limit} appointments on the same day ({date})")]
    CapacityExceeded { limit: usize, date: NaiveDate },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::NotFound => AppError::NotFound(message),
            AppointmentError::Unauthorized(msg) => AppError::Forbidden(msg),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::CapacityExceeded { .. } => AppError::Capacity(message),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidStatusTransition { .. } => AppError::ValidationError(message),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

/// Which status changes `update_status` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status from any status.
    #[default]
    Unrestricted,
    /// Completed and Cancelled are terminal.
    Lifecycle,
}

impl TransitionPolicy {
    pub fn allows(&self, from: AppointmentStatus, to: AppointmentStatus) -> bool {
        match self {
            TransitionPolicy::Unrestricted => true,
            TransitionPolicy::Lifecycle => from == to || self.valid_transitions(from).contains(&to),
        }
    }

    pub fn valid_transitions(&self, from: AppointmentStatus) -> Vec<AppointmentStatus> {
        match self {
            TransitionPolicy::Unrestricted => AppointmentStatus::ALL.to_vec(),
            TransitionPolicy::Lifecycle => match from {
                AppointmentStatus::Pending => vec![
                    AppointmentStatus::Confirmed,
                    AppointmentStatus::Completed,
                    AppointmentStatus::Cancelled,
                ],
                AppointmentStatus::Confirmed => vec![
                    AppointmentStatus::Pending,
                    AppointmentStatus::Completed,
                    AppointmentStatus::Cancelled,
                ],
                AppointmentStatus::Completed | AppointmentStatus::Cancelled => vec![],
            },
        }
    }
}

/// Per-patient, per-day booking cap as the record store enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyLimit {
    pub max_per_day: usize,
    pub count_cancelled: bool,
}

impl DailyLimit {
    pub fn counts(&self, status: AppointmentStatus) -> bool {
        self.count_cancelled || status != AppointmentStatus::Cancelled
    }
}

impl Default for DailyLimit {
    fn default() -> Self {
        Self {
            max_per_day: 3,
            count_cancelled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub max_appointments_per_day: usize,
    pub count_cancelled_toward_daily_limit: bool,
    pub transition_policy: TransitionPolicy,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            max_appointments_per_day: 3,
            count_cancelled_toward_daily_limit: true,
            transition_policy: TransitionPolicy::Unrestricted,
        }
    }
}

impl SchedulingRules {
    pub fn daily_limit(&self) -> DailyLimit {
        DailyLimit {
            max_per_day: self.max_appointments_per_day,
            count_cancelled: self.count_cancelled_toward_daily_limit,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_appointments_per_day: config.max_appointments_per_day,
            count_cancelled_toward_daily_limit: config.count_cancelled_toward_daily_limit,
            transition_policy: if config.enforce_status_transitions {
                TransitionPolicy::Lifecycle
            } else {
                TransitionPolicy::Unrestricted
            },
        }
    }
}
