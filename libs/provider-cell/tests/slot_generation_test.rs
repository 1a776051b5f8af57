// libs/provider-cell/tests/slot_generation_test.rs
//
// Pure-function coverage for window resolution and slot generation.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use provider_cell::models::{AvailabilityRule, AvailabilityWindow};
use provider_cell::services::slots::{generate_slots, resolve_windows};

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

// 2026-09-07 is a Monday (day_of_week = 1 with Sunday = 0).
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 7).unwrap()
}

fn utc(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time(h, m)))
}

fn recurring_rule(provider_id: Uuid, day_of_week: i32, start: NaiveTime, end: NaiveTime) -> AvailabilityRule {
    AvailabilityRule {
        id: Uuid::new_v4(),
        provider_id,
        day_of_week,
        start_time: start,
        end_time: end,
        slot_duration_minutes: 30,
        is_recurring: true,
        exception_date: None,
        is_available: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn exception_rule(
    provider_id: Uuid,
    date: NaiveDate,
    is_available: bool,
    start: NaiveTime,
    end: NaiveTime,
) -> AvailabilityRule {
    AvailabilityRule {
        id: Uuid::new_v4(),
        provider_id,
        day_of_week: 1,
        start_time: start,
        end_time: end,
        slot_duration_minutes: 30,
        is_recurring: false,
        exception_date: Some(date),
        is_available,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// A "now" far enough before the target date that the lead-time cutoff never
// interferes with what a test is actually checking.
fn long_before() -> DateTime<Utc> {
    utc(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(), 0, 0)
}

#[test]
fn recurring_rule_on_matching_weekday_opens_a_window() {
    let provider_id = Uuid::new_v4();
    let rules = vec![recurring_rule(provider_id, 1, time(9, 0), time(17, 0))];

    let windows = resolve_windows(&rules, monday());

    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start_time, time(9, 0));
    assert_eq!(windows[0].end_time, time(17, 0));
}

#[test]
fn rules_on_other_weekdays_are_ignored() {
    let provider_id = Uuid::new_v4();
    let rules = vec![
        recurring_rule(provider_id, 2, time(9, 0), time(17, 0)),
        recurring_rule(provider_id, 5, time(9, 0), time(17, 0)),
    ];

    assert!(resolve_windows(&rules, monday()).is_empty());
}

#[test]
fn disjoint_windows_on_one_weekday_both_apply_sorted() {
    let provider_id = Uuid::new_v4();
    let rules = vec![
        recurring_rule(provider_id, 1, time(14, 0), time(17, 0)),
        recurring_rule(provider_id, 1, time(9, 0), time(12, 0)),
    ];

    let windows = resolve_windows(&rules, monday());

    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].start_time, time(9, 0));
    assert_eq!(windows[1].start_time, time(14, 0));
}

#[test]
fn unavailable_exception_closes_the_whole_day() {
    let provider_id = Uuid::new_v4();
    let rules = vec![
        recurring_rule(provider_id, 1, time(9, 0), time(17, 0)),
        exception_rule(provider_id, monday(), false, time(0, 0), time(0, 0)),
    ];

    assert!(resolve_windows(&rules, monday()).is_empty());
}

#[test]
fn available_exception_replaces_recurring_windows() {
    let provider_id = Uuid::new_v4();
    let rules = vec![
        recurring_rule(provider_id, 1, time(9, 0), time(17, 0)),
        recurring_rule(provider_id, 1, time(18, 0), time(20, 0)),
        exception_rule(provider_id, monday(), true, time(10, 0), time(12, 0)),
    ];

    let windows = resolve_windows(&rules, monday());

    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start_time, time(10, 0));
    assert_eq!(windows[0].end_time, time(12, 0));
}

#[test]
fn exception_for_another_date_does_not_apply() {
    let provider_id = Uuid::new_v4();
    let other_day = NaiveDate::from_ymd_opt(2026, 9, 14).unwrap();
    let rules = vec![
        recurring_rule(provider_id, 1, time(9, 0), time(17, 0)),
        exception_rule(provider_id, other_day, false, time(0, 0), time(0, 0)),
    ];

    assert_eq!(resolve_windows(&rules, monday()).len(), 1);
}

#[test]
fn slots_step_in_fixed_strides_and_drop_trailing_partial() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(10, 15),
        slot_duration_minutes: 30,
    }];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &[]);

    // 09:00 and 09:30 fit; 10:00-10:30 would spill past 10:15.
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].start_time, utc(monday(), 9, 0));
    assert_eq!(slots[0].end_time, utc(monday(), 9, 30));
    assert_eq!(slots[1].start_time, utc(monday(), 9, 30));
}

#[test]
fn window_shorter_than_duration_yields_nothing() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(9, 20),
        slot_duration_minutes: 30,
    }];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &[]);
    assert!(slots.is_empty());
}

#[test]
fn lead_time_hides_slots_starting_too_soon() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(17, 0),
        slot_duration_minutes: 30,
    }];

    // 24h before 12:00 on the target day: everything before noon is cut.
    let now = utc(NaiveDate::from_ymd_opt(2026, 9, 6).unwrap(), 12, 0);
    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, now, &[]);

    assert_eq!(slots.first().map(|s| s.start_time), Some(utc(monday(), 12, 0)));
    assert_eq!(slots.len(), 10); // 12:00 through 16:30
}

#[test]
fn lead_time_can_empty_an_entire_day() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(17, 0),
        slot_duration_minutes: 30,
    }];

    // A request made Monday morning for the same Monday: the 24h lead time
    // pushes the earliest start past closing.
    let now = utc(monday(), 8, 0);
    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, now, &[]);

    assert!(slots.is_empty());
}

#[test]
fn booked_intervals_are_excluded() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(11, 0),
        slot_duration_minutes: 30,
    }];
    let booked = vec![(utc(monday(), 10, 0), utc(monday(), 10, 30))];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &booked);

    let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(
        starts,
        vec![utc(monday(), 9, 0), utc(monday(), 9, 30), utc(monday(), 10, 30)]
    );
}

#[test]
fn partially_overlapping_booking_blocks_both_slots() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(11, 0),
        slot_duration_minutes: 30,
    }];
    // A 45-minute booking straddling the 09:30 and 10:00 slots.
    let booked = vec![(utc(monday(), 9, 45), utc(monday(), 10, 30))];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &booked);

    let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(starts, vec![utc(monday(), 9, 0), utc(monday(), 10, 30)]);
}

#[test]
fn adjacent_booking_does_not_block() {
    let provider_id = Uuid::new_v4();
    let windows = vec![AvailabilityWindow {
        start_time: time(9, 0),
        end_time: time(10, 0),
        slot_duration_minutes: 30,
    }];
    // Booking ends exactly where the 09:00 slot starts.
    let booked = vec![(utc(monday(), 8, 30), utc(monday(), 9, 0))];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &booked);
    assert_eq!(slots.len(), 2);
}

#[test]
fn overlapping_windows_yield_each_start_once() {
    let provider_id = Uuid::new_v4();
    let windows = vec![
        AvailabilityWindow {
            start_time: time(9, 0),
            end_time: time(11, 0),
            slot_duration_minutes: 30,
        },
        AvailabilityWindow {
            start_time: time(10, 0),
            end_time: time(12, 0),
            slot_duration_minutes: 30,
        },
    ];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &[]);

    // 10:00 and 10:30 fall in both windows but must surface once each.
    let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    assert_eq!(
        starts,
        vec![
            utc(monday(), 9, 0),
            utc(monday(), 9, 30),
            utc(monday(), 10, 0),
            utc(monday(), 10, 30),
            utc(monday(), 11, 0),
            utc(monday(), 11, 30),
        ]
    );
}

#[test]
fn slots_from_multiple_windows_come_back_ascending() {
    let provider_id = Uuid::new_v4();
    let windows = vec![
        AvailabilityWindow {
            start_time: time(14, 0),
            end_time: time(15, 0),
            slot_duration_minutes: 30,
        },
        AvailabilityWindow {
            start_time: time(9, 0),
            end_time: time(10, 0),
            slot_duration_minutes: 30,
        },
    ];

    let slots = generate_slots(provider_id, monday(), &windows, 30, 24, long_before(), &[]);

    let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);
    assert_eq!(slots.len(), 4);
}
