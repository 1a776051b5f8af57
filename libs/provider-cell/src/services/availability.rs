// libs/provider-cell/src/services/availability.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityRule, AvailabilityWindow, ProviderError, SchedulingPolicy,
    SetExceptionRequest, SetRecurringRuleRequest, Slot,
};
use crate::services::slots::{generate_slots, resolve_windows};

/// Thin row used when loading booked intervals for slot generation.
#[derive(Debug, Deserialize)]
struct BookedInterval {
    scheduled_at: DateTime<Utc>,
    duration_minutes: i32,
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    policy: SchedulingPolicy,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            policy: SchedulingPolicy::default(),
        }
    }

    pub fn with_policy(config: &AppConfig, policy: SchedulingPolicy) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            policy,
        }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    /// Set or replace a recurring weekly window. A rule with the same
    /// `(provider, weekday, start_time)` is overwritten in place, so repeated
    /// submissions are idempotent; disjoint windows on the same weekday
    /// coexist as separate rules, while a window intersecting a different
    /// rule on that weekday is refused.
    pub async fn set_recurring_rule(
        &self,
        provider_id: Uuid,
        request: SetRecurringRuleRequest,
        auth_token: &str,
    ) -> Result<AvailabilityRule, ProviderError> {
        debug!(
            "Setting recurring availability for provider {} on weekday {}",
            provider_id, request.day_of_week
        );

        validate_weekday(request.day_of_week)?;
        validate_window(request.start_time, request.end_time)?;

        let duration = request
            .slot_duration_minutes
            .unwrap_or(self.policy.default_slot_duration_minutes);
        if duration <= 0 {
            return Err(ProviderError::ValidationError(
                "Slot duration must be positive".to_string(),
            ));
        }

        let existing_path = format!(
            "/rest/v1/provider_availability?provider_id=eq.{}&is_recurring=eq.true&day_of_week=eq.{}",
            provider_id, request.day_of_week,
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &existing_path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;
        let same_day: Vec<AvailabilityRule> = existing
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();

        // A rule that shares the new start is overwritten; any other rule on
        // the weekday must not intersect the new `[start, end)` window, or
        // the same slot start would exist under two rules.
        let intersects = same_day.iter().any(|rule| {
            rule.start_time != request.start_time
                && rule.start_time < request.end_time
                && request.start_time < rule.end_time
        });
        if intersects {
            return Err(ProviderError::ValidationError(
                "Window overlaps an existing rule for this weekday".to_string(),
            ));
        }

        let replaced = same_day
            .iter()
            .find(|rule| rule.start_time == request.start_time);

        let result: Vec<Value> = if let Some(rule) = replaced {
            let rule_id = rule.id;
            let update_data = json!({
                "end_time": request.end_time.format("%H:%M:%S").to_string(),
                "slot_duration_minutes": duration,
                "is_available": true,
                "updated_at": Utc::now().to_rfc3339()
            });
            let path = format!("/rest/v1/provider_availability?id=eq.{}", rule_id);
            self.supabase
                .request_with_headers(
                    Method::PATCH,
                    &path,
                    Some(auth_token),
                    Some(update_data),
                    Some(representation_headers()),
                )
                .await
                .map_err(|e| ProviderError::DatabaseError(e.to_string()))?
        } else {
            let rule_data = json!({
                "provider_id": provider_id,
                "day_of_week": request.day_of_week,
                "start_time": request.start_time.format("%H:%M:%S").to_string(),
                "end_time": request.end_time.format("%H:%M:%S").to_string(),
                "slot_duration_minutes": duration,
                "is_recurring": true,
                "exception_date": null,
                "is_available": true,
                "created_at": Utc::now().to_rfc3339(),
                "updated_at": Utc::now().to_rfc3339()
            });
            self.supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/provider_availability",
                    Some(auth_token),
                    Some(rule_data),
                    Some(representation_headers()),
                )
                .await
                .map_err(|e| ProviderError::DatabaseError(e.to_string()))?
        };

        parse_single_rule(result)
    }

    /// Record a one-day override. An unavailable exception closes the whole
    /// day; an available one replaces the recurring windows with its own.
    pub async fn set_exception(
        &self,
        provider_id: Uuid,
        request: SetExceptionRequest,
        auth_token: &str,
    ) -> Result<AvailabilityRule, ProviderError> {
        debug!(
            "Setting availability exception for provider {} on {}",
            provider_id, request.exception_date
        );

        let (start_time, end_time) = if request.is_available {
            let start = request.start_time.ok_or_else(|| {
                ProviderError::ValidationError(
                    "An available exception requires a start time".to_string(),
                )
            })?;
            let end = request.end_time.ok_or_else(|| {
                ProviderError::ValidationError(
                    "An available exception requires an end time".to_string(),
                )
            })?;
            validate_window(start, end)?;
            (start, end)
        } else {
            // Times are meaningless on a closed day.
            let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
            (midnight, midnight)
        };

        let existing_path = format!(
            "/rest/v1/provider_availability?provider_id=eq.{}&is_recurring=eq.false&exception_date=eq.{}",
            provider_id, request.exception_date,
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &existing_path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let exception_data = json!({
            "provider_id": provider_id,
            "day_of_week": weekday_of(request.exception_date),
            "start_time": start_time.format("%H:%M:%S").to_string(),
            "end_time": end_time.format("%H:%M:%S").to_string(),
            "slot_duration_minutes": self.policy.default_slot_duration_minutes,
            "is_recurring": false,
            "exception_date": request.exception_date,
            "is_available": request.is_available,
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = if let Some(row) = existing.first() {
            let rule_id = row["id"].as_str().unwrap_or_default();
            let path = format!("/rest/v1/provider_availability?id=eq.{}", rule_id);
            self.supabase
                .request_with_headers(
                    Method::PATCH,
                    &path,
                    Some(auth_token),
                    Some(exception_data),
                    Some(representation_headers()),
                )
                .await
                .map_err(|e| ProviderError::DatabaseError(e.to_string()))?
        } else {
            let mut insert_data = exception_data;
            insert_data["created_at"] = json!(Utc::now().to_rfc3339());
            self.supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/provider_availability",
                    Some(auth_token),
                    Some(insert_data),
                    Some(representation_headers()),
                )
                .await
                .map_err(|e| ProviderError::DatabaseError(e.to_string()))?
        };

        parse_single_rule(result)
    }

    /// All rules for a provider, recurring and exceptions alike.
    pub async fn list_rules(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityRule>, ProviderError> {
        let path = format!(
            "/rest/v1/provider_availability?provider_id=eq.{}&order=day_of_week.asc,start_time.asc",
            provider_id,
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityRule>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse rules: {}", e)))
    }

    /// Delete a rule after checking it belongs to the given provider.
    pub async fn delete_rule(
        &self,
        rule_id: Uuid,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ProviderError> {
        let path = format!("/rest/v1/provider_availability?id=eq.{}", rule_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let rule = result.first().ok_or(ProviderError::NotFound)?;
        if rule["provider_id"].as_str() != Some(provider_id.to_string().as_str()) {
            warn!(
                "Provider {} attempted to delete rule {} they do not own",
                provider_id, rule_id
            );
            return Err(ProviderError::Unauthorized);
        }

        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// The open windows for a provider on a date, exceptions applied.
    pub async fn windows_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, ProviderError> {
        let path = format!(
            "/rest/v1/provider_availability?provider_id=eq.{}&or=(is_recurring.eq.true,exception_date.eq.{})",
            provider_id, date,
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let rules: Vec<AvailabilityRule> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityRule>, _>>()
            .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse rules: {}", e)))?;

        Ok(resolve_windows(&rules, date))
    }

    /// Bookable slots for a provider on a date. Advisory only: the booking
    /// path re-validates the chosen slot at commit time.
    pub async fn get_available_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        requested_duration: Option<i32>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<Slot>, ProviderError> {
        debug!(
            "Calculating available slots for provider {} on {}",
            provider_id, date
        );

        let windows = self.windows_for(provider_id, date, auth_token).await?;
        if windows.is_empty() {
            return Ok(vec![]);
        }

        let duration = requested_duration
            .or_else(|| windows.first().map(|w| w.slot_duration_minutes))
            .unwrap_or(self.policy.default_slot_duration_minutes);
        if duration <= 0 {
            return Err(ProviderError::ValidationError(
                "Slot duration must be positive".to_string(),
            ));
        }

        let booked = self
            .booked_intervals(provider_id, date, auth_token)
            .await?;

        let slots = generate_slots(
            provider_id,
            date,
            &windows,
            duration,
            self.policy.lead_time_hours,
            now,
            &booked,
        );

        debug!("Found {} available slots", slots.len());
        Ok(slots)
    }

    /// Intervals held by non-cancelled, non-rejected appointments on a date.
    async fn booked_intervals(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, ProviderError> {
        let start_of_day = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end_of_day = start_of_day + Duration::days(1);

        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&status=not.in.(cancelled,rejected)&scheduled_at=gte.{}&scheduled_at=lt.{}&select=scheduled_at,duration_minutes&order=scheduled_at.asc",
            provider_id,
            urlencoding::encode(&start_of_day.to_rfc3339()),
            urlencoding::encode(&end_of_day.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let rows: Vec<BookedInterval> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<BookedInterval>, _>>()
            .map_err(|e| {
                ProviderError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let end = row.scheduled_at + Duration::minutes(row.duration_minutes as i64);
                (row.scheduled_at, end)
            })
            .collect())
    }
}

fn representation_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}

fn validate_weekday(day_of_week: i32) -> Result<(), ProviderError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(ProviderError::ValidationError(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
        ));
    }
    Ok(())
}

fn validate_window(start: NaiveTime, end: NaiveTime) -> Result<(), ProviderError> {
    if start >= end {
        return Err(ProviderError::ValidationError(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

fn weekday_of(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.weekday().num_days_from_sunday() as i32
}

fn parse_single_rule(result: Vec<Value>) -> Result<AvailabilityRule, ProviderError> {
    let row = result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::DatabaseError("Empty write response".to_string()))?;
    serde_json::from_value(row)
        .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse rule: {}", e)))
}
