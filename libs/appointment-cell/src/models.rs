// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// One row of the `appointments` table. Rows are never deleted; terminal
/// statuses are retained for history. All mutation happens through lifecycle
/// transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub requested_by: Uuid,
    pub requested_date_change: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub cancellation_reason: Option<String>,
    pub outcome_notes: Option<String>,
    // Denormalized copy of the latest transition, written in the same PATCH
    // that moves the status so the event log can always be reconstructed.
    pub last_transition_from: Option<AppointmentStatus>,
    pub last_transition_by: Option<Uuid>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }

    /// Active appointments hold their slot against other bookings.
    pub fn is_active(&self) -> bool {
        !matches!(
            self.status,
            AppointmentStatus::Cancelled | AppointmentStatus::Rejected
        )
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.patient_id.to_string() == user_id || self.provider_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    NoShow,
    Cancelled,
    RescheduleRequested,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected
                | AppointmentStatus::Completed
                | AppointmentStatus::NoShow
                | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Approved => write!(f, "approved"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::RescheduleRequested => write!(f, "reschedule_requested"),
        }
    }
}

/// The closed set of lifecycle actions. Every status move goes through one
/// of these; nothing writes `status` directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Approve,
    Reject,
    Complete,
    MarkNoShow,
    Cancel,
    ProposeReschedule,
    AcceptReschedule,
    RejectReschedule,
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAction::Approve => write!(f, "approve"),
            TransitionAction::Reject => write!(f, "reject"),
            TransitionAction::Complete => write!(f, "complete"),
            TransitionAction::MarkNoShow => write!(f, "mark_no_show"),
            TransitionAction::Cancel => write!(f, "cancel"),
            TransitionAction::ProposeReschedule => write!(f, "propose_reschedule"),
            TransitionAction::AcceptReschedule => write!(f, "accept_reschedule"),
            TransitionAction::RejectReschedule => write!(f, "reject_reschedule"),
        }
    }
}

/// One row of the `appointment_events` table, consumed by the external
/// notifier. Insertion is best-effort: the appointment row itself carries
/// enough (`last_transition_*`) to rebuild a lost event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub from_status: AppointmentStatus,
    pub to_status: AppointmentStatus,
    pub actor_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub provider_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
    pub location: Option<String>,
    /// Admins may book on behalf of a patient; ignored for everyone else.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRequest {
    pub action: TransitionAction,
    pub notes: Option<String>,
    pub reason: Option<String>,
    /// Only meaningful for `propose_reschedule`.
    pub proposed_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub proposed_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Read-only projection of a committed appointment for external calendars.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarEntry {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    pub notes: Option<String>,
    pub location: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No availability window covers the requested time: {0}")]
    Availability(String),

    #[error("Appointment slot conflicts with an existing booking")]
    Conflict,

    #[error("Cannot {action} an appointment in status {from}")]
    InvalidTransition {
        from: AppointmentStatus,
        action: TransitionAction,
    },

    #[error("Appointment not found")]
    NotFound,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(String),
}
