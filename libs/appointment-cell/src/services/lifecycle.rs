// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::{
    AppointmentDetails, AppointmentError, AppointmentFilter, AppointmentStatus, DailyLimit,
    SchedulingRules, TransitionPolicy,
};
use crate::services::notification::AppointmentNotificationBus;
use crate::services::records::{load_appointment, populate};
use crate::store::RecordStore;

/// Status changes, explicit and implicit.
#[derive(Clone)]
pub struct AppointmentLifecycleService {
    store: Arc<dyn RecordStore>,
    notifications: AppointmentNotificationBus,
    policy: TransitionPolicy,
    limit: DailyLimit,
}

impl AppointmentLifecycleService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifications: AppointmentNotificationBus,
        rules: &SchedulingRules,
    ) -> Self {
        Self {
            store,
            notifications,
            policy: rules.transition_policy,
            limit: rules.daily_limit(),
        }
    }

    /// Sets any of the four statuses. Callers are not role-checked. Reviving a
    /// cancelled booking can still fail on the slot or the daily limit.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: &str,
        user: Option<&User>,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let new_status: AppointmentStatus = new_status.parse()?;
        if let Some(user) = user {
            debug!("{} {} sets {} to {}", user.role, user.id, appointment_id, new_status);
        }

        let mut appointment = load_appointment(self.store.as_ref(), appointment_id).await?;
        self.validate_status_transition(appointment.status, new_status)?;

        appointment.status = new_status;
        let updated = self.store.update_appointment(&appointment, &self.limit).await?;
        let details = populate(self.store.as_ref(), updated).await;
        self.notifications.publish(details.clone());

        info!("Appointment {} is now {}", appointment_id, new_status);
        Ok(details)
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if !self.policy.allows(current_status, new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        self.policy.valid_transitions(current_status)
    }

    /// Marks the pair's non-cancelled appointments on `date` as `Completed`.
    /// Finding none is not an error.
    pub async fn complete_after_prescription(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let filter = AppointmentFilter::for_patient_on(patient_id, date)
            .with_doctor(doctor_id)
            .active_only();
        let appointments = self.store.find_appointments(&filter).await?;

        if appointments.is_empty() {
            debug!("No appointment to complete for patient {} with doctor {} on {}", patient_id, doctor_id, date);
        }

        let mut completed = Vec::with_capacity(appointments.len());
        for mut appointment in appointments {
            appointment.status = AppointmentStatus::Completed;
            let updated = self.store.update_appointment(&appointment, &self.limit).await?;
            let details = populate(self.store.as_ref(), updated).await;
            self.notifications.publish(details.clone());
            info!("Appointment {} completed by prescription", details.id());
            completed.push(details);
        }

        Ok(completed)
    }
}
