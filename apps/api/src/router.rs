use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, doctor_routes, prescription_routes};
use appointment_cell::state::AppointmentState;
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/appointments", appointment_routes(config.clone(), state.clone()))
        .nest("/prescriptions", prescription_routes(config.clone(), state.clone()))
        .nest("/doctors", doctor_routes(config, state))
}
