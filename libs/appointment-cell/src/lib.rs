pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;
pub mod store;

pub use models::*;
pub use router::{appointment_routes, doctor_routes, prescription_routes};
pub use services::booking::AppointmentBookingService;
pub use services::directory::DoctorDirectoryService;
pub use services::lifecycle::AppointmentLifecycleService;
pub use services::notification::{AppointmentNotificationBus, AppointmentSubscription};
pub use services::prescription::PrescriptionService;
pub use state::AppointmentState;
pub use store::{MemoryRecordStore, RecordStore, StoreError, SupabaseRecordStore};
