use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn provider_routes(state: Arc<AppConfig>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/{provider_id}/slots", get(handlers::get_available_slots_public));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/{provider_id}/rules", post(handlers::set_recurring_rule))
        .route("/{provider_id}/rules", get(handlers::list_rules))
        .route("/{provider_id}/rules/{rule_id}", delete(handlers::delete_rule))
        .route("/{provider_id}/exceptions", post(handlers::set_exception))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
