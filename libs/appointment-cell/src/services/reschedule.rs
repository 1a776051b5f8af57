// libs/appointment-cell/src/services/reschedule.rs
//
// Two-phase reschedule negotiation. Requesting a change only runs the cheap
// policy gate (the counterpart has not agreed yet); accepting re-runs the
// full validator because the booked set may have moved since the request.

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use provider_cell::models::SchedulingPolicy;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{Appointment, AppointmentError, TransitionAction};
use crate::services::conflict::{check_policy, ConflictValidator};
use crate::services::lifecycle::{
    actor_uuid, validate_transition, LifecycleService, TransitionPayload,
};

pub struct RescheduleService {
    supabase: SupabaseClient,
    lifecycle: LifecycleService,
    validator: ConflictValidator,
    policy: SchedulingPolicy,
}

impl RescheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            lifecycle: LifecycleService::new(config),
            validator: ConflictValidator::new(config),
            policy: SchedulingPolicy::default(),
        }
    }

    /// Propose a new time for an approved appointment. Only the policy gate
    /// runs here; the original time keeps holding the slot until the
    /// counterpart accepts.
    pub async fn request_change(
        &self,
        appointment_id: Uuid,
        proposed_start: chrono::DateTime<Utc>,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        let now = Utc::now();

        let to_status = validate_transition(
            &appointment,
            TransitionAction::ProposeReschedule,
            actor,
            now,
            &TransitionPayload::default(),
        )?;
        check_policy(proposed_start, appointment.duration_minutes, now, &self.policy)?;

        debug!(
            "Appointment {}: reschedule to {} requested",
            appointment_id, proposed_start
        );

        self.lifecycle
            .commit_transition(
                &appointment,
                to_status,
                actor_uuid(actor)?,
                json!({ "requested_date_change": proposed_start.to_rfc3339() }),
                auth_token,
            )
            .await
    }

    /// Accept the proposed time. The full validator runs against it with
    /// this appointment excluded from the overlap scan; on any failure the
    /// row stays at `reschedule_requested` with the proposal intact.
    pub async fn accept_change(
        &self,
        appointment_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        let now = Utc::now();

        let to_status = validate_transition(
            &appointment,
            TransitionAction::AcceptReschedule,
            actor,
            now,
            &TransitionPayload::default(),
        )?;

        let proposed = appointment.requested_date_change.ok_or_else(|| {
            AppointmentError::Validation("No proposed time to accept".to_string())
        })?;

        self.validator
            .validate(
                appointment.provider_id,
                appointment.patient_id,
                proposed,
                appointment.duration_minutes,
                now,
                Some(appointment.id),
                auth_token,
            )
            .await?;

        self.lifecycle
            .commit_transition(
                &appointment,
                to_status,
                actor_uuid(actor)?,
                json!({
                    "scheduled_at": proposed.to_rfc3339(),
                    "requested_date_change": null
                }),
                auth_token,
            )
            .await
    }

    /// Decline the proposed time: back to `approved`, original
    /// `scheduled_at` untouched, proposal cleared.
    pub async fn reject_change(
        &self,
        appointment_id: Uuid,
        actor: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.fetch(appointment_id, auth_token).await?;
        let now = Utc::now();

        let to_status = validate_transition(
            &appointment,
            TransitionAction::RejectReschedule,
            actor,
            now,
            &TransitionPayload::default(),
        )?;

        self.lifecycle
            .commit_transition(
                &appointment,
                to_status,
                actor_uuid(actor)?,
                json!({ "requested_date_change": null }),
                auth_token,
            )
            .await
    }

    async fn fetch(
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
}
