use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ProviderError, SetExceptionRequest, SetRecurringRuleRequest, SlotQuery};
use crate::services::availability::AvailabilityService;

fn map_provider_error(e: ProviderError) -> AppError {
    match e {
        ProviderError::NotFound => AppError::NotFound("Availability rule not found".to_string()),
        ProviderError::Unauthorized => AppError::Auth(e.to_string()),
        ProviderError::ValidationError(msg) => AppError::ValidationError(msg),
        ProviderError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Only the provider themselves or an admin may manage a schedule.
fn check_schedule_access(user: &User, provider_id: Uuid) -> Result<(), AppError> {
    if user.is_admin() || user.id == provider_id.to_string() {
        Ok(())
    } else {
        Err(AppError::Auth(
            "Not authorized to manage this provider's schedule".to_string(),
        ))
    }
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots_public(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let slots = availability_service
        .get_available_slots(
            provider_id,
            query.date,
            query.duration_minutes,
            Utc::now(),
            &state.supabase_anon_key,
        )
        .await
        .map_err(map_provider_error)?;

    let total = slots.len();
    Ok(Json(json!({
        "provider_id": provider_id,
        "date": query.date,
        "slots": slots,
        "total": total
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn set_recurring_rule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<SetRecurringRuleRequest>,
) -> Result<Json<Value>, AppError> {
    check_schedule_access(&user, provider_id)?;

    let availability_service = AvailabilityService::new(&state);
    let rule = availability_service
        .set_recurring_rule(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn set_exception(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<SetExceptionRequest>,
) -> Result<Json<Value>, AppError> {
    check_schedule_access(&user, provider_id)?;

    let availability_service = AvailabilityService::new(&state);
    let rule = availability_service
        .set_exception(provider_id, request, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn list_rules(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    check_schedule_access(&user, provider_id)?;

    let availability_service = AvailabilityService::new(&state);
    let rules = availability_service
        .list_rules(provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    let total = rules.len();
    Ok(Json(json!({
        "rules": rules,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn delete_rule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path((provider_id, rule_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    check_schedule_access(&user, provider_id)?;

    let availability_service = AvailabilityService::new(&state);
    availability_service
        .delete_rule(rule_id, provider_id, auth.token())
        .await
        .map_err(map_provider_error)?;

    Ok(Json(json!({
        "message": "Availability rule deleted"
    })))
}
