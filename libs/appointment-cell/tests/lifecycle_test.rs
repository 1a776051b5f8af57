// libs/appointment-cell/tests/lifecycle_test.rs
//
// The transition table, edge by edge, without storage.

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentError, AppointmentStatus, TransitionAction};
use appointment_cell::services::lifecycle::{
    allowed_actions, transition_target, validate_transition, TransitionPayload,
};
use shared_models::auth::User;
use shared_utils::test_utils::TestUser;

fn appointment(status: AppointmentStatus) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        scheduled_at: now + Duration::days(3),
        duration_minutes: 30,
        status,
        requested_by: Uuid::new_v4(),
        requested_date_change: None,
        notes: None,
        location: None,
        cancellation_reason: None,
        outcome_notes: None,
        last_transition_from: None,
        last_transition_by: None,
        last_transition_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn provider_of(appointment: &Appointment) -> User {
    TestUser::provider("provider@example.com")
        .with_id(&appointment.provider_id.to_string())
        .to_user()
}

fn patient_of(appointment: &Appointment) -> User {
    TestUser::patient("patient@example.com")
        .with_id(&appointment.patient_id.to_string())
        .to_user()
}

fn payload_with_notes(notes: &str) -> TransitionPayload {
    TransitionPayload {
        notes: Some(notes.to_string()),
        reason: None,
    }
}

fn payload_with_reason(reason: &str) -> TransitionPayload {
    TransitionPayload {
        notes: None,
        reason: Some(reason.to_string()),
    }
}

#[test]
fn provider_approves_pending() {
    let appt = appointment(AppointmentStatus::Pending);
    let result = validate_transition(
        &appt,
        TransitionAction::Approve,
        &provider_of(&appt),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_eq!(result.unwrap(), AppointmentStatus::Approved);
}

#[test]
fn patient_cannot_approve() {
    let appt = appointment(AppointmentStatus::Pending);
    let result = validate_transition(
        &appt,
        TransitionAction::Approve,
        &patient_of(&appt),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

#[test]
fn provider_rejects_pending() {
    let appt = appointment(AppointmentStatus::Pending);
    let result = validate_transition(
        &appt,
        TransitionAction::Reject,
        &provider_of(&appt),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_eq!(result.unwrap(), AppointmentStatus::Rejected);
}

#[test]
fn complete_requires_the_scheduled_time_to_have_passed() {
    let appt = appointment(AppointmentStatus::Approved);
    let before = appt.scheduled_at - Duration::hours(1);
    let result = validate_transition(
        &appt,
        TransitionAction::Complete,
        &provider_of(&appt),
        before,
        &payload_with_notes("seen, advised rest"),
    );
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[test]
fn complete_requires_outcome_notes() {
    let appt = appointment(AppointmentStatus::Approved);
    let after = appt.scheduled_at + Duration::hours(1);
    let result = validate_transition(
        &appt,
        TransitionAction::Complete,
        &provider_of(&appt),
        after,
        &TransitionPayload::default(),
    );
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[test]
fn complete_succeeds_after_the_slot_with_notes() {
    let appt = appointment(AppointmentStatus::Approved);
    let after = appt.scheduled_at + Duration::hours(1);
    let result = validate_transition(
        &appt,
        TransitionAction::Complete,
        &provider_of(&appt),
        after,
        &payload_with_notes("seen, advised rest"),
    );
    assert_eq!(result.unwrap(), AppointmentStatus::Completed);
}

#[test]
fn no_show_requires_the_scheduled_time_to_have_passed() {
    let appt = appointment(AppointmentStatus::Approved);
    let before = appt.scheduled_at - Duration::minutes(5);
    let result = validate_transition(
        &appt,
        TransitionAction::MarkNoShow,
        &provider_of(&appt),
        before,
        &TransitionPayload::default(),
    );
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[test]
fn cancel_requires_a_reason() {
    let appt = appointment(AppointmentStatus::Approved);
    let result = validate_transition(
        &appt,
        TransitionAction::Cancel,
        &patient_of(&appt),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_matches!(result, Err(AppointmentError::Validation(_)));
}

#[test]
fn either_party_can_cancel_with_a_reason() {
    let appt = appointment(AppointmentStatus::Approved);
    for actor in [patient_of(&appt), provider_of(&appt)] {
        let result = validate_transition(
            &appt,
            TransitionAction::Cancel,
            &actor,
            Utc::now(),
            &payload_with_reason("family emergency"),
        );
        assert_eq!(result.unwrap(), AppointmentStatus::Cancelled);
    }
}

#[test]
fn an_outsider_cannot_cancel() {
    let appt = appointment(AppointmentStatus::Approved);
    let outsider = TestUser::patient("other@example.com").to_user();
    let result = validate_transition(
        &appt,
        TransitionAction::Cancel,
        &outsider,
        Utc::now(),
        &payload_with_reason("not mine"),
    );
    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

#[test]
fn reschedule_negotiation_edges() {
    let approved = appointment(AppointmentStatus::Approved);
    let requested = appointment(AppointmentStatus::RescheduleRequested);

    let propose = validate_transition(
        &approved,
        TransitionAction::ProposeReschedule,
        &patient_of(&approved),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_eq!(propose.unwrap(), AppointmentStatus::RescheduleRequested);

    let accept = validate_transition(
        &requested,
        TransitionAction::AcceptReschedule,
        &provider_of(&requested),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_eq!(accept.unwrap(), AppointmentStatus::Approved);

    // Rejecting a reschedule lands back at approved, never pending.
    let reject = validate_transition(
        &requested,
        TransitionAction::RejectReschedule,
        &patient_of(&requested),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_eq!(reject.unwrap(), AppointmentStatus::Approved);
}

#[test]
fn terminal_states_allow_no_actions() {
    for status in [
        AppointmentStatus::Rejected,
        AppointmentStatus::Completed,
        AppointmentStatus::NoShow,
        AppointmentStatus::Cancelled,
    ] {
        assert!(allowed_actions(status).is_empty(), "{} should be terminal", status);
        assert!(status.is_terminal());
    }
}

#[test]
fn illegal_edges_report_invalid_transition() {
    let appt = appointment(AppointmentStatus::Pending);
    let result = validate_transition(
        &appt,
        TransitionAction::Complete,
        &provider_of(&appt),
        Utc::now() + Duration::days(30),
        &payload_with_notes("too eager"),
    );
    assert_matches!(
        result,
        Err(AppointmentError::InvalidTransition {
            from: AppointmentStatus::Pending,
            action: TransitionAction::Complete,
        })
    );

    let cancelled = appointment(AppointmentStatus::Cancelled);
    let result = validate_transition(
        &cancelled,
        TransitionAction::Approve,
        &provider_of(&cancelled),
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert_matches!(result, Err(AppointmentError::InvalidTransition { .. }));
}

#[test]
fn admin_can_act_as_provider() {
    let appt = appointment(AppointmentStatus::Pending);
    let admin = TestUser::admin("admin@example.com").to_user();
    let result = validate_transition(
        &appt,
        TransitionAction::Approve,
        &admin,
        Utc::now(),
        &TransitionPayload::default(),
    );
    assert!(result.is_ok());
}

#[test]
fn every_action_has_a_fixed_target() {
    assert_eq!(
        transition_target(TransitionAction::Approve),
        AppointmentStatus::Approved
    );
    assert_eq!(
        transition_target(TransitionAction::Reject),
        AppointmentStatus::Rejected
    );
    assert_eq!(
        transition_target(TransitionAction::Complete),
        AppointmentStatus::Completed
    );
    assert_eq!(
        transition_target(TransitionAction::MarkNoShow),
        AppointmentStatus::NoShow
    );
    assert_eq!(
        transition_target(TransitionAction::Cancel),
        AppointmentStatus::Cancelled
    );
    assert_eq!(
        transition_target(TransitionAction::ProposeReschedule),
        AppointmentStatus::RescheduleRequested
    );
    assert_eq!(
        transition_target(TransitionAction::AcceptReschedule),
        AppointmentStatus::Approved
    );
    assert_eq!(
        transition_target(TransitionAction::RejectReschedule),
        AppointmentStatus::Approved
    );
}
