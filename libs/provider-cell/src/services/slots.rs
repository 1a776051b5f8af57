// libs/provider-cell/src/services/slots.rs
//
// Pure slot computation: no storage access, no clock access. Everything the
// calculation depends on (rules, bookings, "now") comes in as arguments so
// the whole thing is unit-testable.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{AvailabilityRule, AvailabilityWindow, Slot};

/// Resolve the open windows for one provider on one date.
///
/// An exception row for `date` wins exclusively: if it marks the day
/// unavailable the whole day is closed regardless of recurring rules,
/// otherwise its window is the only one. Without an exception, every
/// recurring rule whose weekday matches contributes a window. Windows are
/// returned ordered by start time.
pub fn resolve_windows(rules: &[AvailabilityRule], date: NaiveDate) -> Vec<AvailabilityWindow> {
    let day_of_week = date.weekday().num_days_from_sunday() as i32;

    if let Some(exception) = rules
        .iter()
        .find(|r| !r.is_recurring && r.exception_date == Some(date))
    {
        if !exception.is_available {
            return vec![];
        }
        return vec![AvailabilityWindow {
            start_time: exception.start_time,
            end_time: exception.end_time,
            slot_duration_minutes: exception.slot_duration_minutes,
        }];
    }

    let mut windows: Vec<AvailabilityWindow> = rules
        .iter()
        .filter(|r| r.is_recurring && r.is_available && r.day_of_week == day_of_week)
        .map(|r| AvailabilityWindow {
            start_time: r.start_time,
            end_time: r.end_time,
            slot_duration_minutes: r.slot_duration_minutes,
        })
        .collect();

    windows.sort_by_key(|w| w.start_time);
    windows
}

/// Generate the bookable slots for one provider on one date.
///
/// For each window a cursor steps from the window start in strides of
/// `duration_minutes`; a slot is emitted only when it fits entirely inside
/// the window (trailing partial periods are dropped, never rounded). Slots
/// starting before `now + lead_time_hours` are discarded, as is any slot
/// intersecting a booked interval. Output is ordered ascending by start.
pub fn generate_slots(
    provider_id: Uuid,
    date: NaiveDate,
    windows: &[AvailabilityWindow],
    duration_minutes: i32,
    lead_time_hours: i64,
    now: DateTime<Utc>,
    booked: &[(DateTime<Utc>, DateTime<Utc>)],
) -> Vec<Slot> {
    let duration = Duration::minutes(duration_minutes as i64);
    let earliest_start = now + Duration::hours(lead_time_hours);

    let mut slots = Vec::new();

    for window in windows {
        let mut cursor = date.and_time(window.start_time).and_utc();
        let window_end = date.and_time(window.end_time).and_utc();

        while cursor + duration <= window_end {
            let slot_end = cursor + duration;

            let overlaps_booking = booked
                .iter()
                .any(|(booked_start, booked_end)| cursor < *booked_end && slot_end > *booked_start);

            if cursor >= earliest_start && !overlaps_booking {
                slots.push(Slot {
                    provider_id,
                    start_time: cursor,
                    end_time: slot_end,
                    duration_minutes,
                });
            }

            cursor = slot_end;
        }
    }

    // Windows arrive ordered, but can interleave when a caller passes
    // unordered input; overlapping windows would also land the cursor on
    // the same start twice. Output is strictly ascending with no ties.
    slots.sort_by_key(|s| s.start_time);
    slots.dedup_by_key(|s| s.start_time);
    slots
}
