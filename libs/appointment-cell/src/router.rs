// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::state::AppointmentState;

pub fn appointment_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment).get(handlers::get_appointments_by_date))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/status", put(handlers::update_appointment_status))
        .route("/{appointment_id}/subscribe", get(handlers::subscribe_appointment))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn prescription_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::prescribe_medicine).get(handlers::get_prescription))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn doctor_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    // Public: registration forms need the catalogue before anyone has a token
    let public_routes = Router::new()
        .route("/specializations", get(handlers::get_specializations));

    let protected_routes = Router::new()
        .route("/", get(handlers::get_doctors))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
