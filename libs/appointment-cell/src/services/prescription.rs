// libs/appointment-cell/src/services/prescription.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::{Role, User};

use crate::models::{AppointmentError, NewPrescription, PrescribeRequest, Prescription};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct PrescriptionService {
    store: Arc<dyn RecordStore>,
    lifecycle: AppointmentLifecycleService,
}

impl PrescriptionService {
    pub fn new(store: Arc<dyn RecordStore>, lifecycle: AppointmentLifecycleService) -> Self {
        Self { store, lifecycle }
    }

    /// Records a prescription and completes today's appointment for the pair.
    pub async fn prescribe(
        &self,
        user: &User,
        request: PrescribeRequest,
    ) -> Result<Prescription, AppointmentError> {
        let today = Utc::now().date_naive();
        self.prescribe_on(user, request, today).await
    }

    /// Same as [`prescribe`](Self::prescribe) with the appointment day given explicitly.
    pub async fn prescribe_on(
        &self,
        user: &User,
        request: PrescribeRequest,
        appointment_date: NaiveDate,
    ) -> Result<Prescription, AppointmentError> {
        if user.role != Role::Doctor || user.id != request.doctor_id {
            return Err(AppointmentError::Unauthorized(
                "Only the treating doctor can prescribe medicine".to_string(),
            ));
        }

        let medicines: Vec<String> = request
            .medicines
            .into_iter()
            .map(|medicine| medicine.trim().to_string())
            .filter(|medicine| !medicine.is_empty())
            .collect();
        if medicines.is_empty() {
            return Err(AppointmentError::ValidationError(
                "At least one medicine is required".to_string(),
            ));
        }
        if request.diagnosis.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Diagnosis is required".to_string(),
            ));
        }

        let prescription = self
            .store
            .insert_prescription(NewPrescription {
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                medicines,
                diagnosis: request.diagnosis.trim().to_string(),
                date: Utc::now(),
            })
            .await?;

        info!(
            "Prescription {} recorded for patient {} by doctor {}",
            prescription.id, prescription.patient_id, prescription.doctor_id
        );

        self.lifecycle
            .complete_after_prescription(request.patient_id, request.doctor_id, appointment_date)
            .await?;

        Ok(prescription)
    }

    pub async fn latest_prescription(
        &self,
        user: &User,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<Prescription>, AppointmentError> {
        if user.id != patient_id && user.id != doctor_id && !user.is_admin() {
            return Err(AppointmentError::Unauthorized(
                "You cannot view this prescription".to_string(),
            ));
        }

        Ok(self.store.latest_prescription(patient_id, doctor_id).await?)
    }
}
