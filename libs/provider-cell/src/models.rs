// libs/provider-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

/// One row of the `provider_availability` table. A recurring rule repeats
/// weekly on `day_of_week`; an exception (`is_recurring = false`) applies to
/// exactly `exception_date` and overrides every recurring rule on that date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 6 = Saturday
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub is_recurring: bool,
    pub exception_date: Option<NaiveDate>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An open interval on a concrete date, after exception resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
}

/// A bookable candidate. Computed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRecurringRuleRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetExceptionRequest {
    pub exception_date: NaiveDate,
    pub is_available: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// SCHEDULING POLICY
// ==============================================================================

/// Clinic-wide business rules shared by slot generation and booking
/// validation. Slot duration can additionally be overridden per provider
/// through the availability rule's `slot_duration_minutes` column.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    pub opening_hour: u32,
    pub closing_hour: u32,
    pub weekends_closed: bool,
    pub lead_time_hours: i64,
    pub default_slot_duration_minutes: i32,
    pub no_show_grace_hours: i64,
    pub max_active_per_patient_per_day: usize,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            opening_hour: 8,
            closing_hour: 18,
            weekends_closed: true,
            lead_time_hours: 24,
            default_slot_duration_minutes: 30,
            no_show_grace_hours: 5,
            max_active_per_patient_per_day: 1,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Availability rule not found")]
    NotFound,

    #[error("Not authorized to manage this provider's availability")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
