// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::{Role, User};

use crate::models::{
    AppointmentDetails, AppointmentError, AppointmentFilter, AppointmentStatus,
    BookAppointmentRequest, NewAppointment, RescheduleAppointmentRequest, SchedulingRules, Slot,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::notification::AppointmentNotificationBus;
use crate::services::records::{load_appointment, populate, populate_all};
use crate::store::RecordStore;

const SLOT_TAKEN: &str = "The selected doctor is not available at the specified date and time.";
const DUPLICATE_BOOKING: &str = "You already have an appointment with this doctor at the selected date and time.";

/// Booking, rescheduling and cancellation.
#[derive(Clone)]
pub struct AppointmentBookingService {
    store: Arc<dyn RecordStore>,
    conflict_service: ConflictDetectionService,
    notifications: AppointmentNotificationBus,
    rules: SchedulingRules,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifications: AppointmentNotificationBus,
        rules: SchedulingRules,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            store,
            notifications,
            rules,
        }
    }

    /// Books a new `Pending` appointment for the calling patient.
    pub async fn book_appointment(
        &self,
        user: &User,
        request: BookAppointmentRequest,
    ) -> Result<AppointmentDetails, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {} on {} at {}",
            request.patient_id, request.doctor_id, request.date, request.time
        );

        if user.id != request.patient_id {
            return Err(AppointmentError::Unauthorized(
                "You can only book appointments for yourself".to_string(),
            ));
        }

        if request.time.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Appointment time is required".to_string(),
            ));
        }

        let slot = Slot {
            doctor_id: request.doctor_id,
            date: request.date,
            time: request.time.clone(),
        };
        self.ensure_slot_free(request.patient_id, &slot, None).await?;
        self.ensure_within_daily_limit(request.patient_id, request.date, None).await?;

        let appointment = self
            .store
            .insert_appointment(
                NewAppointment {
                    patient_id: request.patient_id,
                    doctor_id: request.doctor_id,
                    date: request.date,
                    time: request.time,
                    status: AppointmentStatus::Pending,
                },
                &self.rules.daily_limit(),
            )
            .await
            .map_err(|e| {
                warn!("Insert rejected for {}: {}", slot, e);
                AppointmentError::from(e)
            })?;

        info!("Appointment {} booked", appointment.id);
        Ok(populate(self.store.as_ref(), appointment).await)
    }

    /// Moves an appointment to a new doctor, date or time and resets it to `Pending`.
    pub async fn reschedule_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<AppointmentDetails, AppointmentError> {
        info!("Rescheduling appointment {}", appointment_id);

        let mut appointment = load_appointment(self.store.as_ref(), appointment_id).await?;

        if appointment.patient_id != user.id && !user.is_admin() {
            return Err(AppointmentError::Unauthorized(
                "Only the patient or an admin can reschedule this appointment".to_string(),
            ));
        }

        if let Some(time) = &request.new_time {
            if time.trim().is_empty() {
                return Err(AppointmentError::ValidationError(
                    "Appointment time is required".to_string(),
                ));
            }
        }

        let slot = Slot {
            doctor_id: request.new_doctor_id.unwrap_or(appointment.doctor_id),
            date: request.new_date.unwrap_or(appointment.date),
            time: request.new_time.clone().unwrap_or_else(|| appointment.time.clone()),
        };

        let limit = self.rules.daily_limit();
        self.ensure_slot_free(appointment.patient_id, &slot, Some(appointment.id)).await?;
        // A row already counted on the target day cannot push it over the limit.
        let counted_on_target_day = slot.date == appointment.date && limit.counts(appointment.status);
        if !counted_on_target_day {
            self.ensure_within_daily_limit(appointment.patient_id, slot.date, Some(appointment.id))
                .await?;
        }

        appointment.doctor_id = slot.doctor_id;
        appointment.date = slot.date;
        appointment.time = slot.time;
        appointment.status = AppointmentStatus::Pending;

        let updated = self.store.update_appointment(&appointment, &limit).await?;
        let details = populate(self.store.as_ref(), updated).await;
        self.notifications.publish(details.clone());

        info!("Appointment {} rescheduled to {}", appointment_id, details.appointment.slot());
        Ok(details)
    }

    /// Cancels regardless of the current status.
    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
    ) -> Result<AppointmentDetails, AppointmentError> {
        info!("Cancelling appointment {}", appointment_id);

        let mut appointment = load_appointment(self.store.as_ref(), appointment_id).await?;

        if !appointment.is_participant(user.id) {
            return Err(AppointmentError::Unauthorized(
                "Only the patient or the doctor can cancel this appointment".to_string(),
            ));
        }

        appointment.status = AppointmentStatus::Cancelled;
        let updated = self
            .store
            .update_appointment(&appointment, &self.rules.daily_limit())
            .await?;
        let details = populate(self.store.as_ref(), updated).await;
        self.notifications.publish(details.clone());

        Ok(details)
    }

    pub async fn get_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let appointment = load_appointment(self.store.as_ref(), appointment_id).await?;

        if !appointment.is_participant(user.id) && !user.is_admin() {
            return Err(AppointmentError::Unauthorized(
                "You are not a participant of this appointment".to_string(),
            ));
        }

        Ok(populate(self.store.as_ref(), appointment).await)
    }

    /// Patients see their own bookings, doctors their own schedule, admins everything.
    pub async fn appointments_on_date(
        &self,
        user: &User,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentDetails>, AppointmentError> {
        let base = AppointmentFilter {
            date: Some(date),
            ..AppointmentFilter::default()
        };
        let filter = match user.role {
            Role::Patient => base.with_patient(user.id),
            Role::Doctor => base.with_doctor(user.id),
            Role::Admin => base,
        };

        let appointments = self.store.find_appointments(&filter).await?;
        debug!("Found {} appointments on {} for {} {}", appointments.len(), date, user.role, user.id);

        Ok(populate_all(self.store.as_ref(), appointments).await)
    }

    async fn ensure_slot_free(
        &self,
        patient_id: Uuid,
        slot: &Slot,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let conflicts = self
            .conflict_service
            .check_slot_conflicts(patient_id, slot, exclude_appointment_id)
            .await?;

        if conflicts.duplicate_booking {
            return Err(AppointmentError::Conflict(DUPLICATE_BOOKING.to_string()));
        }
        if conflicts.doctor_slot_taken {
            return Err(AppointmentError::Conflict(SLOT_TAKEN.to_string()));
        }
        Ok(())
    }

    async fn ensure_within_daily_limit(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let within_limit = self
            .conflict_service
            .check_patient_daily_limit(patient_id, date, exclude_appointment_id, &self.rules)
            .await?;

        if !within_limit {
            warn!("Patient {} reached the daily limit on {}", patient_id, date);
            return Err(AppointmentError::CapacityExceeded {
                limit: self.rules.max_appointments_per_day,
                date,
            });
        }
        Ok(())
    }
}
