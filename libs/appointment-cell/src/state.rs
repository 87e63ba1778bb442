// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use tracing::info;

use shared_config::{AppConfig, RecordStoreBackend};

use crate::models::SchedulingRules;
use crate::services::booking::AppointmentBookingService;
use crate::services::directory::DoctorDirectoryService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notification::AppointmentNotificationBus;
use crate::services::prescription::PrescriptionService;
use crate::store::{MemoryRecordStore, RecordStore, SupabaseRecordStore};

/// Everything the appointment handlers share. One notification bus per
/// process, handed to every service that publishes.
#[derive(Clone)]
pub struct AppointmentState {
    pub store: Arc<dyn RecordStore>,
    pub notifications: AppointmentNotificationBus,
    pub booking: AppointmentBookingService,
    pub lifecycle: AppointmentLifecycleService,
    pub prescriptions: PrescriptionService,
    pub directory: DoctorDirectoryService,
}

impl AppointmentState {
    pub fn new(store: Arc<dyn RecordStore>, rules: SchedulingRules, notification_buffer: usize) -> Self {
        let notifications = AppointmentNotificationBus::new(notification_buffer);
        let lifecycle = AppointmentLifecycleService::new(Arc::clone(&store), notifications.clone(), &rules);
        let booking = AppointmentBookingService::new(Arc::clone(&store), notifications.clone(), rules);
        let prescriptions = PrescriptionService::new(Arc::clone(&store), lifecycle.clone());
        let directory = DoctorDirectoryService::new(Arc::clone(&store));

        Self {
            store,
            notifications,
            booking,
            lifecycle,
            prescriptions,
            directory,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let store: Arc<dyn RecordStore> = match config.record_store {
            RecordStoreBackend::Memory => {
                info!("Using in-memory record store");
                Arc::new(MemoryRecordStore::new())
            }
            RecordStoreBackend::Supabase => {
                info!("Using Supabase record store at {}", config.supabase_url);
                Arc::new(SupabaseRecordStore::new(config))
            }
        };

        Self::new(store, SchedulingRules::from_config(config), config.notification_buffer)
    }
}
