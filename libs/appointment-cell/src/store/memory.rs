// libs/appointment-cell/src/store/memory.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::Role;

use crate::models::{
    Appointment, AppointmentFilter, AppointmentStatus, DailyLimit, NewAppointment, NewPrescription,
    Prescription, Slot, UserSummary,
};
use crate::store::{RecordStore, StoreError};

#[derive(Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    prescriptions: Vec<Prescription>,
    users: HashMap<Uuid, UserSummary>,
}

impl Tables {
    fn slot_taken(&self, slot: &Slot, exclude_id: Option<Uuid>) -> bool {
        let filter = AppointmentFilter::for_slot(slot).excluding(exclude_id).active_only();
        self.appointments.values().any(|existing| filter.matches(existing))
    }

    fn counted_on(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        exclude_id: Option<Uuid>,
        limit: &DailyLimit,
    ) -> usize {
        let filter = AppointmentFilter::for_patient_on(patient_id, date).excluding(exclude_id);
        self.appointments
            .values()
            .filter(|existing| filter.matches(existing) && limit.counts(existing.status))
            .count()
    }
}

/// Process-local record store. Every write runs under one lock, so the slot
/// uniqueness and daily limit checks are atomic with the write.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserSummary) {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id, user);
    }

    pub async fn appointment_count(&self) -> usize {
        self.tables.read().await.appointments.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&id).cloned())
    }

    async fn find_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        let mut matches: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn insert_appointment(
        &self,
        appointment: NewAppointment,
        limit: &DailyLimit,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;

        let slot = appointment.slot();
        if appointment.status != AppointmentStatus::Cancelled
            && tables.slot_taken(&slot, None)
        {
            debug!("Rejecting insert: {} is already booked", slot);
            return Err(StoreError::UniqueViolation(slot.to_string()));
        }

        if limit.counts(appointment.status)
            && tables.counted_on(appointment.patient_id, appointment.date, None, limit) >= limit.max_per_day
        {
            debug!("Rejecting insert: patient {} is full on {}", appointment.patient_id, appointment.date);
            return Err(StoreError::DailyLimitReached {
                limit: limit.max_per_day,
                date: appointment.date,
            });
        }

        let now = Utc::now();
        let stored = Appointment {
            id: Uuid::new_v4(),
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status,
            created_at: now,
            updated_at: now,
        };

        tables.appointments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_appointment(
        &self,
        appointment: &Appointment,
        limit: &DailyLimit,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(current) = tables.appointments.get(&appointment.id) else {
            return Err(StoreError::Missing(appointment.id));
        };
        let counted_before = current.patient_id == appointment.patient_id
            && current.date == appointment.date
            && limit.counts(current.status);

        let slot = appointment.slot();
        if appointment.is_active() && tables.slot_taken(&slot, Some(appointment.id)) {
            debug!("Rejecting update of {}: {} is already booked", appointment.id, slot);
            return Err(StoreError::UniqueViolation(slot.to_string()));
        }

        if !counted_before
            && limit.counts(appointment.status)
            && tables.counted_on(appointment.patient_id, appointment.date, Some(appointment.id), limit)
                >= limit.max_per_day
        {
            debug!("Rejecting update of {}: patient is full on {}", appointment.id, appointment.date);
            return Err(StoreError::DailyLimitReached {
                limit: limit.max_per_day,
                date: appointment.date,
            });
        }

        let stored = tables
            .appointments
            .get_mut(&appointment.id)
            .ok_or(StoreError::Missing(appointment.id))?;
        stored.doctor_id = appointment.doctor_id;
        stored.date = appointment.date;
        stored.time = appointment.time.clone();
        stored.status = appointment.status;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn insert_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<Prescription, StoreError> {
        let stored = Prescription {
            id: Uuid::new_v4(),
            patient_id: prescription.patient_id,
            doctor_id: prescription.doctor_id,
            medicines: prescription.medicines,
            diagnosis: prescription.diagnosis,
            date: prescription.date,
            created_at: Utc::now(),
        };

        self.tables.write().await.prescriptions.push(stored.clone());
        Ok(stored)
    }

    async fn latest_prescription(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<Prescription>, StoreError> {
        let tables = self.tables.read().await;
        // Later pushes win ties on `date`.
        Ok(tables
            .prescriptions
            .iter()
            .filter(|p| p.patient_id == patient_id && p.doctor_id == doctor_id)
            .fold(None::<&Prescription>, |latest, candidate| match latest {
                Some(current) if current.date > candidate.date => Some(current),
                _ => Some(candidate),
            })
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserSummary>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_users_by_role(&self, role: Role) -> Result<Vec<UserSummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut users: Vec<UserSummary> = tables
            .users
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }
}
