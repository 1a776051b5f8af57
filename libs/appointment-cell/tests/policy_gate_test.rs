// libs/appointment-cell/tests/policy_gate_test.rs

use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};

use appointment_cell::models::AppointmentError;
use appointment_cell::services::conflict::check_policy;
use provider_cell::models::SchedulingPolicy;

// 2026-09-07 is a Monday, 2026-09-05 a Saturday.
fn at(day: u32, hour: u32, minute: u32) -> chrono::DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(2026, 9, day).unwrap();
    Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
}

fn week_earlier(day: u32) -> chrono::DateTime<Utc> {
    at(day, 0, 0) - chrono::Duration::days(7)
}

#[test]
fn weekday_slot_inside_hours_passes() {
    let policy = SchedulingPolicy::default();
    assert!(check_policy(at(7, 10, 0), 30, week_earlier(7), &policy).is_ok());
}

#[test]
fn weekend_is_rejected_first() {
    let policy = SchedulingPolicy::default();
    let result = check_policy(at(5, 10, 0), 30, week_earlier(5), &policy);
    assert_matches!(result, Err(AppointmentError::Validation(msg)) if msg.contains("weekend"));
}

#[test]
fn before_opening_is_rejected() {
    let policy = SchedulingPolicy::default();
    let result = check_policy(at(7, 7, 30), 30, week_earlier(7), &policy);
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[test]
fn slot_spilling_past_closing_is_rejected() {
    let policy = SchedulingPolicy::default();
    // Starts inside hours but ends 18:15.
    let result = check_policy(at(7, 17, 45), 30, week_earlier(7), &policy);
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[test]
fn slot_ending_exactly_at_closing_passes() {
    let policy = SchedulingPolicy::default();
    assert!(check_policy(at(7, 17, 30), 30, week_earlier(7), &policy).is_ok());
}

#[test]
fn lead_time_is_enforced() {
    let policy = SchedulingPolicy::default();
    // Booked Monday 07:00 for Monday 10:00: only 3 hours ahead.
    let result = check_policy(at(7, 10, 0), 30, at(7, 7, 0), &policy);
    assert_matches!(result, Err(AppointmentError::Validation(msg)) if msg.contains("advance"));
}

#[test]
fn lead_time_boundary_is_inclusive() {
    let policy = SchedulingPolicy::default();
    // Exactly 24 hours ahead is allowed.
    assert!(check_policy(at(8, 10, 0), 30, at(7, 10, 0), &policy).is_ok());
}

#[test]
fn weekends_can_be_opened_by_policy() {
    let policy = SchedulingPolicy {
        weekends_closed: false,
        ..SchedulingPolicy::default()
    };
    assert!(check_policy(at(5, 10, 0), 30, week_earlier(5), &policy).is_ok());
}
