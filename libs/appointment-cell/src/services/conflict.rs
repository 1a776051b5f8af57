// libs/appointment-cell/src/services/conflict.rs
//
// Commit-time validation of a chosen slot. Slot listings are advisory and
// can go stale the moment they are produced; every write path runs this
// validator again immediately before touching storage.

use chrono::{DateTime, Datelike, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use provider_cell::models::SchedulingPolicy;
use provider_cell::services::availability::AvailabilityService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

#[derive(Debug, Deserialize)]
struct BookedRow {
    id: Uuid,
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
}

/// Clinic-wide policy gate: weekend closure, operating hours, lead time.
/// Pure so the reschedule cheap-check and the tests can call it directly.
pub fn check_policy(
    start: DateTime<Utc>,
    duration_minutes: i32,
    now: DateTime<Utc>,
    policy: &SchedulingPolicy,
) -> Result<(), AppointmentError> {
    let end = start + Duration::minutes(duration_minutes as i64);

    let weekday = start.weekday().num_days_from_sunday();
    if policy.weekends_closed && (weekday == 0 || weekday == 6) {
        return Err(AppointmentError::Validation(
            "Appointments cannot be booked on weekends".to_string(),
        ));
    }

    let opening = start
        .date_naive()
        .and_hms_opt(policy.opening_hour, 0, 0)
        .unwrap_or_default()
        .and_utc();
    let closing = start
        .date_naive()
        .and_hms_opt(policy.closing_hour, 0, 0)
        .unwrap_or_default()
        .and_utc();
    if start < opening || end > closing {
        return Err(AppointmentError::Validation(format!(
            "Appointments must fall between {:02}:00 and {:02}:00",
            policy.opening_hour, policy.closing_hour
        )));
    }

    if start < now + Duration::hours(policy.lead_time_hours) {
        return Err(AppointmentError::Validation(format!(
            "Appointments must be booked at least {} hours in advance",
            policy.lead_time_hours
        )));
    }

    Ok(())
}

pub struct ConflictValidator {
    supabase: SupabaseClient,
    availability: AvailabilityService,
    policy: SchedulingPolicy,
}

impl ConflictValidator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability: AvailabilityService::new(config),
            policy: SchedulingPolicy::default(),
        }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    /// Run the four checks in their fixed order, short-circuiting on the
    /// first failure: policy gate, window containment, provider overlap,
    /// patient daily limit. `exclude` removes one appointment from the
    /// overlap and daily-limit scans, used when re-validating a reschedule
    /// of that same appointment.
    pub async fn validate(
        &self,
        provider_id: Uuid,
        patient_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        now: DateTime<Utc>,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating slot {} ({} min) for provider {}",
            start, duration_minutes, provider_id
        );

        check_policy(start, duration_minutes, now, &self.policy)?;

        let date = start.date_naive();
        let end = start + Duration::minutes(duration_minutes as i64);

        let windows = self
            .availability
            .windows_for(provider_id, date, auth_token)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;
        let contained = windows.iter().any(|w| {
            let window_start = date.and_time(w.start_time).and_utc();
            let window_end = date.and_time(w.end_time).and_utc();
            window_start <= start && end <= window_end
        });
        if !contained {
            return Err(AppointmentError::Availability(format!(
                "Provider has no open window covering {}",
                start
            )));
        }

        let day_rows = self
            .active_appointments_on(provider_id, date, auth_token)
            .await?;
        let overlapping = day_rows.iter().any(|row| {
            if exclude == Some(row.id) {
                return false;
            }
            let row_end = row.scheduled_at + Duration::minutes(row.duration_minutes as i64);
            start < row_end && row.scheduled_at < end
        });
        if overlapping {
            return Err(AppointmentError::Conflict);
        }

        let held = self
            .patient_active_count_on(patient_id, date, exclude, auth_token)
            .await?;
        if held >= self.policy.max_active_per_patient_per_day {
            return Err(AppointmentError::Validation(
                "Patient already holds an active appointment on that day".to_string(),
            ));
        }

        Ok(())
    }

    async fn active_appointments_on(
        &self,
        provider_id: Uuid,
        date: chrono::NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookedRow>, AppointmentError> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let day_end = day_start + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&status=not.in.(cancelled,rejected)&scheduled_at=gte.{}&scheduled_at=lt.{}&select=id,scheduled_at,duration_minutes",
            provider_id,
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&day_end.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookedRow>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse appointments: {}", e)))
    }

    async fn patient_active_count_on(
        &self,
        patient_id: Uuid,
        date: chrono::NaiveDate,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<usize, AppointmentError> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let day_end = day_start + Duration::days(1);

        let mut path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&status=in.(pending,approved)&scheduled_at=gte.{}&scheduled_at=lt.{}&select=id",
            patient_id,
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&day_end.to_rfc3339()),
        );
        if let Some(excluded_id) = exclude {
            path.push_str(&format!("&id=neq.{}", excluded_id));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Ok(result.len())
    }
}
