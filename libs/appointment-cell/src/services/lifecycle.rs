// libs/appointment-cell/src/services/lifecycle.rs
//
// The status state machine. The table lives in pure functions so every edge
// is unit-testable; `LifecycleService` owns the storage commit, which is a
// guarded PATCH so concurrent actors cannot both win the same transition.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{DbError, SupabaseClient};
use shared_models::auth::User;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, TransitionAction};

/// Free-text attachments carried by some actions: `complete` stores outcome
/// notes, `cancel` stores the cancellation reason.
#[derive(Debug, Clone, Default)]
pub struct TransitionPayload {
    pub notes: Option<String>,
    pub reason: Option<String>,
}

/// The status an action lands in when it is legal.
pub fn transition_target(action: TransitionAction) -> AppointmentStatus {
    match action {
        TransitionAction::Approve => AppointmentStatus::Approved,
        TransitionAction::Reject => AppointmentStatus::Rejected,
        TransitionAction::Complete => AppointmentStatus::Completed,
        TransitionAction::MarkNoShow => AppointmentStatus::NoShow,
        TransitionAction::Cancel => AppointmentStatus::Cancelled,
        TransitionAction::ProposeReschedule => AppointmentStatus::RescheduleRequested,
        TransitionAction::AcceptReschedule => AppointmentStatus::Approved,
        TransitionAction::RejectReschedule => AppointmentStatus::Approved,
    }
}

/// Every action legal from a given status. Terminal statuses allow none.
pub fn allowed_actions(status: AppointmentStatus) -> Vec<TransitionAction> {
    match status {
        AppointmentStatus::Pending => vec![TransitionAction::Approve, TransitionAction::Reject],
        AppointmentStatus::Approved => vec![
            TransitionAction::Complete,
            TransitionAction::MarkNoShow,
            TransitionAction::Cancel,
            TransitionAction::ProposeReschedule,
        ],
        AppointmentStatus::RescheduleRequested => vec![
            TransitionAction::AcceptReschedule,
            TransitionAction::RejectReschedule,
        ],
        AppointmentStatus::Rejected
        | AppointmentStatus::Completed
        | AppointmentStatus::NoShow
        | AppointmentStatus::Cancelled => vec![],
    }
}

/// The authenticated id as a Uuid, for the `last_transition_by` column.
pub fn actor_uuid(actor: &User) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(&actor.id)
        .map_err(|_| AppointmentError::Unauthorized("Malformed actor id".to_string()))
}

fn actor_is_provider(appointment: &Appointment, actor: &User) -> bool {
    actor.is_admin() || actor.id == appointment.provider_id.to_string()
}

fn actor_is_party(appointment: &Appointment, actor: &User) -> bool {
    actor.is_admin() || appointment.involves(&actor.id)
}

/// Check an action against the transition table and its preconditions
/// without touching storage. Returns the target status on success; on any
/// failure the appointment is left exactly as it was.
pub fn validate_transition(
    appointment: &Appointment,
    action: TransitionAction,
    actor: &User,
    now: DateTime<Utc>,
    payload: &TransitionPayload,
) -> Result<AppointmentStatus, AppointmentError> {
    debug!(
        "Validating action {} on appointment {} (status {})",
        action, appointment.id, appointment.status
    );

    if !allowed_actions(appointment.status).contains(&action) {
        warn!(
            "Illegal transition attempted: {} from {}",
            action, appointment.status
        );
        return Err(AppointmentError::InvalidTransition {
            from: appointment.status,
            action,
        });
    }

    match action {
        TransitionAction::Approve | TransitionAction::Reject => {
            if !actor_is_provider(appointment, actor) {
                return Err(AppointmentError::Unauthorized(
                    "Only the provider can approve or reject".to_string(),
                ));
            }
        }
        TransitionAction::Complete => {
            if !actor_is_provider(appointment, actor) {
                return Err(AppointmentError::Unauthorized(
                    "Only the provider can complete an appointment".to_string(),
                ));
            }
            if now < appointment.scheduled_at {
                return Err(AppointmentError::Validation(
                    "Cannot complete an appointment before its scheduled time".to_string(),
                ));
            }
            if payload.notes.as_deref().map_or(true, |n| n.trim().is_empty()) {
                return Err(AppointmentError::Validation(
                    "Completing an appointment requires outcome notes".to_string(),
                ));
            }
        }
        TransitionAction::MarkNoShow => {
            if !actor_is_provider(appointment, actor) {
                return Err(AppointmentError::Unauthorized(
                    "Only the provider can record a no-show".to_string(),
                ));
            }
            if now < appointment.scheduled_at {
                return Err(AppointmentError::Validation(
                    "Cannot record a no-show before the scheduled time".to_string(),
                ));
            }
        }
        TransitionAction::Cancel => {
            if !actor_is_party(appointment, actor) {
                return Err(AppointmentError::Unauthorized(
                    "Only a party to the appointment can cancel it".to_string(),
                ));
            }
            if payload.reason.as_deref().map_or(true, |r| r.trim().is_empty()) {
                return Err(AppointmentError::Validation(
                    "Cancelling requires a reason".to_string(),
                ));
            }
        }
        TransitionAction::ProposeReschedule
        | TransitionAction::AcceptReschedule
        | TransitionAction::RejectReschedule => {
            if !actor_is_party(appointment, actor) {
                return Err(AppointmentError::Unauthorized(
                    "Only a party to the appointment can negotiate a reschedule".to_string(),
                ));
            }
        }
    }

    Ok(transition_target(action))
}

pub struct LifecycleService {
    supabase: SupabaseClient,
}

impl LifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Commit a validated transition. The PATCH carries a `status=eq.<from>`
    /// guard: when another actor moved the row first the update matches
    /// nothing, PostgREST returns an empty representation and the caller
    /// gets `Conflict` instead of a silent double transition.
    ///
    /// The `last_transition_*` columns ride in the same PATCH as the status
    /// change; the `appointment_events` insert afterwards is best-effort
    /// because the event is always reconstructable from those columns.
    pub async fn commit_transition(
        &self,
        appointment: &Appointment,
        to_status: AppointmentStatus,
        actor_id: Uuid,
        extra_fields: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let from_status = appointment.status;
        let now = Utc::now();

        let mut update_data = json!({
            "status": to_status.to_string(),
            "last_transition_from": from_status.to_string(),
            "last_transition_by": actor_id,
            "last_transition_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });
        if let (Some(update), Some(extra)) = (update_data.as_object_mut(), extra_fields.as_object())
        {
            for (key, value) in extra {
                update.insert(key.clone(), value.clone());
            }
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment.id, from_status
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update_data), Some(headers))
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation(_) => AppointmentError::Conflict,
                other => AppointmentError::Database(other.to_string()),
            })?;

        let Some(row) = result.into_iter().next() else {
            // The guard matched nothing: someone else transitioned first.
            warn!(
                "Lost transition race on appointment {} ({} -> {})",
                appointment.id, from_status, to_status
            );
            return Err(AppointmentError::Conflict);
        };

        let updated: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointment: {}", e)))?;

        info!(
            "Appointment {} transitioned {} -> {}",
            appointment.id, from_status, to_status
        );

        self.record_event(appointment.id, from_status, to_status, actor_id, now, auth_token)
            .await;

        Ok(updated)
    }

    async fn record_event(
        &self,
        appointment_id: Uuid,
        from_status: AppointmentStatus,
        to_status: AppointmentStatus,
        actor_id: Uuid,
        occurred_at: DateTime<Utc>,
        auth_token: &str,
    ) {
        let event_data = json!({
            "appointment_id": appointment_id,
            "from_status": from_status.to_string(),
            "to_status": to_status.to_string(),
            "actor_id": actor_id,
            "occurred_at": occurred_at.to_rfc3339()
        });

        let result: Result<Vec<Value>, _> = self
            .supabase
            .request(
                Method::POST,
                "/rest/v1/appointment_events",
                Some(auth_token),
                Some(event_data),
            )
            .await;

        if let Err(e) = result {
            // Recoverable: the notifier can rebuild the event from the
            // appointment's last_transition_* columns.
            warn!(
                "Failed to record lifecycle event for appointment {}: {}",
                appointment_id, e
            );
        }
    }
}
