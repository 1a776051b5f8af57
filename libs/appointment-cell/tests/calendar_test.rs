// libs/appointment-cell/tests/calendar_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::{Extension, Path, Query, State};
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers;
use appointment_cell::models::CalendarQuery;
use appointment_cell::services::CalendarService;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

#[tokio::test]
async fn calendar_projects_committed_appointments() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let patient_id = Uuid::parse_str(&patient.id).unwrap();
    let provider_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(3);

    let mut row = MockSupabaseResponses::appointment_response(
        &Uuid::new_v4().to_string(),
        &patient.id,
        &provider_id.to_string(),
        &start.to_rfc3339(),
        "approved",
    );
    row["location"] = json!("Room 2");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let service = CalendarService::new(&TestConfig::with_supabase_url(&mock_server.uri()).to_app_config());
    let entries = service
        .entries_for_user(
            patient_id,
            &CalendarQuery {
                date_from: None,
                date_to: None,
            },
            "test-token",
        )
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.end - entry.start, Duration::minutes(30));
    assert!(entry.title.contains(&provider_id.to_string()));
    assert_eq!(entry.location.as_deref(), Some("Room 2"));
}

#[tokio::test]
async fn users_cannot_read_another_users_calendar() {
    let mock_server = MockServer::start().await;
    let viewer = TestUser::patient("viewer@example.com");
    let other_user = Uuid::new_v4();

    let state = Arc::new(TestConfig::with_supabase_url(&mock_server.uri()).to_app_config());
    let result = handlers::get_calendar(
        State(state),
        TypedHeader(Authorization::bearer("test-token").unwrap()),
        Extension(viewer.to_user()),
        Path(other_user),
        Query(CalendarQuery {
            date_from: None,
            date_to: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}
