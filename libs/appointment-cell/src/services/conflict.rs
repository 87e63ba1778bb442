// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    AppointmentError, AppointmentFilter, ConflictCheckResponse, SchedulingRules, Slot,
};
use crate::store::RecordStore;

/// Read-side pre-checks for the slot and daily-limit rules. The record
/// store's uniqueness constraint remains the final word on slots.
#[derive(Clone)]
pub struct ConflictDetectionService {
    store: Arc<dyn RecordStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Checks the doctor slot rule and the duplicate self-booking rule
    /// independently. Cancelled rows never conflict.
    pub async fn check_slot_conflicts(
        &self,
        patient_id: Uuid,
        slot: &Slot,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for {}", slot);

        let slot_filter = AppointmentFilter::for_slot(slot)
            .excluding(exclude_appointment_id)
            .active_only();

        let doctor_slot = self.store.find_appointments(&slot_filter).await?;
        let duplicates = self
            .store
            .find_appointments(&slot_filter.clone().with_patient(patient_id))
            .await?;

        let doctor_slot_taken = !doctor_slot.is_empty();
        let duplicate_booking = !duplicates.is_empty();
        let has_conflict = doctor_slot_taken || duplicate_booking;

        if has_conflict {
            warn!(
                "Conflict detected for {} - {} conflicting appointments",
                slot,
                doctor_slot.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            doctor_slot_taken,
            duplicate_booking,
            conflicting_appointments: doctor_slot,
        })
    }

    /// `true` while the patient is still below the daily limit on `date`.
    pub async fn check_patient_daily_limit(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        rules: &SchedulingRules,
    ) -> Result<bool, AppointmentError> {
        let mut filter = AppointmentFilter::for_patient_on(patient_id, date)
            .excluding(exclude_appointment_id);
        if !rules.count_cancelled_toward_daily_limit {
            filter = filter.active_only();
        }

        let booked = self.store.count_appointments(&filter).await?;
        debug!(
            "Patient {} holds {} of {} appointments on {}",
            patient_id, booked, rules.max_appointments_per_day, date
        );

        Ok(booked < rules.max_appointments_per_day)
    }
}
