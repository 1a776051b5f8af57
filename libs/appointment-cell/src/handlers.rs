// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentSearchQuery, BookAppointmentRequest, CalendarQuery,
    RescheduleRequest, TransitionRequest,
};
use crate::services::{BookingService, CalendarService, RescheduleService};

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::Validation(msg) => AppError::ValidationError(msg),
        AppointmentError::Availability(msg) => AppError::BadRequest(msg),
        AppointmentError::Conflict => AppError::Conflict(e.to_string()),
        AppointmentError::InvalidTransition { .. } => AppError::BadRequest(e.to_string()),
        AppointmentError::NotFound => AppError::NotFound(e.to_string()),
        AppointmentError::Unauthorized(msg) => AppError::Auth(msg),
        AppointmentError::Database(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; admins may book on behalf.
    let patient_id = match (user.is_admin(), request.patient_id) {
        (true, Some(on_behalf)) => on_behalf,
        _ => Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Malformed user id".to_string()))?,
    };

    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .request_appointment(patient_id, request, &user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    if !user.is_admin() && !appointment.involves(&user.id) {
        return Err(AppError::Auth(
            "Not a party to this appointment".to_string(),
        ));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    // Non-admins only ever see their own side of the table.
    if !user.is_admin() {
        let own_id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("Malformed user id".to_string()))?;
        if user.is_provider() {
            query.provider_id = Some(own_id);
        } else {
            query.patient_id = Some(own_id);
        }
    }

    let booking_service = BookingService::new(&state);
    let appointments = booking_service
        .search_appointments(&query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn transition_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .transition(appointment_id, request, &user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn request_reschedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .request_change(appointment_id, request.proposed_start, &user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn accept_reschedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .accept_change(appointment_id, &user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reject_reschedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let reschedule_service = RescheduleService::new(&state);
    let appointment = reschedule_service
        .reject_change(appointment_id, &user, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_calendar(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && user.id != user_id.to_string() {
        return Err(AppError::Auth(
            "Cannot read another user's calendar".to_string(),
        ));
    }

    let calendar_service = CalendarService::new(&state);
    let entries = calendar_service
        .entries_for_user(user_id, &query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let total = entries.len();
    Ok(Json(json!({
        "entries": entries,
        "total": total
    })))
}
