// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentsByDateQuery, BookAppointmentRequest, PrescribeRequest, PrescriptionQuery,
    RescheduleAppointmentRequest, UpdateStatusRequest,
};
use crate::services::notification::AppointmentSubscription;
use crate::state::AppointmentState;

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.book_appointment(&user, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointments_by_date(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentsByDateQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking.appointments_on_date(&user, query.date).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
        "date": query.date
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.get_appointment(&user, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .reschedule_appointment(&user, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.cancel_appointment(&user, appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .lifecycle
        .update_status(appointment_id, &request.status, Some(&user))
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment status updated to {}", appointment.status())
    })))
}

// ==============================================================================
// LIVE UPDATES
// ==============================================================================

/// Upgrades to a WebSocket that streams every change to one appointment as a
/// JSON text frame. Only participants and admins may watch. Access is decided
/// before the upgrade headers are looked at.
pub async fn subscribe_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    state.booking.get_appointment(&user, appointment_id).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!("Subscription to {} is not a WebSocket handshake: {}", appointment_id, rejection);
            return Ok(rejection.into_response());
        }
    };

    // Registered before the upgrade completes so nothing published after
    // this response is missed.
    let subscription = state.notifications.subscribe(appointment_id);
    info!("User {} watching appointment {}", user.id, appointment_id);

    Ok(ws.on_upgrade(move |socket| forward_changes(socket, subscription)))
}

async fn forward_changes(mut socket: WebSocket, mut subscription: AppointmentSubscription) {
    loop {
        tokio::select! {
            change = subscription.next() => {
                let Some(appointment) = change else { break };
                let payload = match serde_json::to_string(&appointment) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to serialize appointment {}: {}", appointment.id(), e);
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("Watcher of appointment {} disconnected", subscription.appointment_id());
    subscription.cancel();
}

// ==============================================================================
// PRESCRIPTION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn prescribe_medicine(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<PrescribeRequest>,
) -> Result<Json<Value>, AppError> {
    let prescription = state.prescriptions.prescribe(&user, request).await?;

    Ok(Json(json!({
        "success": true,
        "prescription": prescription,
        "message": "Prescription recorded successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_prescription(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(query): Query<PrescriptionQuery>,
) -> Result<Json<Value>, AppError> {
    // Absence is a normal answer, not an error
    let prescription = state
        .prescriptions
        .latest_prescription(&user, query.patient_id, query.doctor_id)
        .await?;

    Ok(Json(json!({ "prescription": prescription })))
}

// ==============================================================================
// DOCTOR DIRECTORY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctors(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("{} {} listing doctors", user.role, user.id);
    let doctors = state.directory.list_doctors().await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_specializations(
    State(state): State<Arc<AppointmentState>>,
) -> Json<Value> {
    Json(json!({ "specializations": state.directory.specializations() }))
}
