// libs/appointment-cell/src/services/records.rs
use tracing::warn;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentDetails, AppointmentError, UserSummary};
use crate::store::RecordStore;

pub(crate) async fn load_appointment(
    store: &dyn RecordStore,
    appointment_id: Uuid,
) -> Result<Appointment, AppointmentError> {
    store
        .find_appointment(appointment_id)
        .await?
        .ok_or(AppointmentError::NotFound)
}

/// A failed directory lookup leaves the summary empty. Callers have usually
/// committed a write already and must still report and publish it.
async fn summary(store: &dyn RecordStore, user_id: Uuid) -> Option<UserSummary> {
    match store.find_user(user_id).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            warn!("User {} missing from the directory", user_id);
            None
        }
        Err(e) => {
            warn!("Directory lookup for user {} failed: {}", user_id, e);
            None
        }
    }
}

/// Fills in patient and doctor summaries. Unknown users stay empty.
pub(crate) async fn populate(store: &dyn RecordStore, appointment: Appointment) -> AppointmentDetails {
    let patient = summary(store, appointment.patient_id).await;
    let doctor = summary(store, appointment.doctor_id).await;

    AppointmentDetails {
        appointment,
        patient,
        doctor,
    }
}

pub(crate) async fn populate_all(
    store: &dyn RecordStore,
    appointments: Vec<Appointment>,
) -> Vec<AppointmentDetails> {
    let mut populated = Vec::with_capacity(appointments.len());
    for appointment in appointments {
        populated.push(populate(store, appointment).await);
    }
    populated
}
