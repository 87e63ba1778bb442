// libs/appointment-cell/src/services/directory.rs
use std::sync::Arc;

use tracing::debug;

use shared_models::auth::Role;

use crate::models::{
    AppointmentError, Specialization, UserSummary, SPECIALIZATIONS, UNSPECIFIED_SPECIALIZATION,
};
use crate::store::RecordStore;

/// Read-only view of the doctors patients can book with.
#[derive(Clone)]
pub struct DoctorDirectoryService {
    store: Arc<dyn RecordStore>,
}

impl DoctorDirectoryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Every doctor in the directory. A missing or blank specialization reads
    /// as "Not Specified".
    pub async fn list_doctors(&self) -> Result<Vec<UserSummary>, AppointmentError> {
        let doctors = self.store.find_users_by_role(Role::Doctor).await?;
        debug!("Directory lists {} doctors", doctors.len());

        Ok(doctors
            .into_iter()
            .map(|mut doctor| {
                let unspecified = doctor
                    .specialization
                    .as_deref()
                    .map_or(true, |s| s.trim().is_empty());
                if unspecified {
                    doctor.specialization = Some(UNSPECIFIED_SPECIALIZATION.to_string());
                }
                doctor
            })
            .collect())
    }

    pub fn specializations(&self) -> &'static [Specialization] {
        SPECIALIZATIONS
    }
}
