// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use provider_cell::models::SchedulingPolicy;
use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, TransitionAction, TransitionRequest,
};
use crate::services::conflict::ConflictValidator;
use crate::services::lifecycle::{
    actor_uuid, validate_transition, LifecycleService, TransitionPayload,
};
use crate::services::reschedule::RescheduleService;

/// Entry point for booking and for every lifecycle action. Holds the
/// validator and the coordinator so handlers talk to one service.
pub struct BookingService {
    supabase: SupabaseClient,
    validator: ConflictValidator,
    lifecycle: LifecycleService,
    reschedule: RescheduleService,
    policy: SchedulingPolicy,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            validator: ConflictValidator::new(config),
            lifecycle: LifecycleService::new(config),
            reschedule: RescheduleService::new(config),
            policy: SchedulingPolicy::default(),
        }
    }

    /// Validate the chosen slot and insert the appointment at `pending`.
    ///
    /// The validator runs first, but the real double-booking guarantee is
    /// the storage unique index on `(provider_id, scheduled_at)` over
    /// active rows: when two callers race past validation, one insert comes
    /// back 409 and surfaces as `Conflict`. Callers regenerate slots rather
    /// than retrying the same one.
    pub async fn request_appointment(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let duration = request
            .duration_minutes
            .unwrap_or(self.policy.default_slot_duration_minutes);
        if duration <= 0 {
            return Err(AppointmentError::Validation(
                "Duration must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        self.validator
            .validate(
                request.provider_id,
                patient_id,
                request.scheduled_at,
                duration,
                now,
                None,
                auth_token,
            )
            .await?;

        debug!(
            "Booking appointment for patient {} with provider {} at {}",
            patient_id, request.provider_id, request.scheduled_at
        );

        let appointment_data = json!({
            "patient_id": patient_id,
            "provider_id": request.provider_id,
            "scheduled_at": request.scheduled_at.to_rfc3339(),
            "duration_minutes": duration,
            "status": AppointmentStatus::Pending.to_string(),
            "requested_by": actor_uuid(actor)?,
            "requested_date_change": null,
            "notes": request.notes,
            "location": request.location,
            "cancellation_reason": null,
            "outcome_notes": null,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation(_) => AppointmentError::Conflict,
                other => AppointmentError::Database(other.to_string()),
            })?;

        let row = result.into_iter().next().ok_or_else(|| {
            AppointmentError::Database("Empty insert response".to_string())
        })?;
        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))?;

        info!("Appointment {} created at pending", appointment.id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))
    }

    /// Filtered listing, newest first.
    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = "/rest/v1/appointments?order=scheduled_at.desc".to_string();

        if let Some(patient_id) = query.patient_id {
            path.push_str(&format!("&patient_id=eq.{}", patient_id));
        }
        if let Some(provider_id) = query.provider_id {
            path.push_str(&format!("&provider_id=eq.{}", provider_id));
        }
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(date_from) = query.date_from {
            let from = date_from.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
            path.push_str(&format!(
                "&scheduled_at=gte.{}",
                urlencoding::encode(&from.to_rfc3339())
            ));
        }
        if let Some(date_to) = query.date_to {
            let to = date_to.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
                + chrono::Duration::days(1);
            path.push_str(&format!(
                "&scheduled_at=lt.{}",
                urlencoding::encode(&to.to_rfc3339())
            ));
        }
        path.push_str(&format!("&limit={}", query.limit.unwrap_or(50)));
        if let Some(offset) = query.offset {
            path.push_str(&format!("&offset={}", offset));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointments: {}", e)))
    }

    /// Single entry point for every lifecycle action. Reschedule actions
    /// route through the coordinator; the rest validate against the
    /// transition table and commit through the guarded PATCH.
    pub async fn transition(
        &self,
        appointment_id: Uuid,
        request: TransitionRequest,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        match request.action {
            TransitionAction::ProposeReschedule => {
                let proposed = request.proposed_start.ok_or_else(|| {
                    AppointmentError::Validation(
                        "propose_reschedule requires a proposed start time".to_string(),
                    )
                })?;
                self.reschedule
                    .request_change(appointment_id, proposed, actor, auth_token)
                    .await
            }
            TransitionAction::AcceptReschedule => {
                self.reschedule
                    .accept_change(appointment_id, actor, auth_token)
                    .await
            }
            TransitionAction::RejectReschedule => {
                self.reschedule
                    .reject_change(appointment_id, actor, auth_token)
                    .await
            }
            action => {
                let appointment = self.get_appointment(appointment_id, auth_token).await?;
                let now = Utc::now();
                let payload = TransitionPayload {
                    notes: request.notes.clone(),
                    reason: request.reason.clone(),
                };

                let to_status =
                    validate_transition(&appointment, action, actor, now, &payload)?;

                let extra_fields = match action {
                    TransitionAction::Complete => json!({ "outcome_notes": payload.notes }),
                    TransitionAction::Cancel => {
                        json!({ "cancellation_reason": payload.reason })
                    }
                    _ => json!({}),
                };

                self.lifecycle
                    .commit_transition(
                        &appointment,
                        to_status,
                        actor_uuid(actor)?,
                        extra_fields,
                        auth_token,
                    )
                    .await
            }
        }
    }
}
