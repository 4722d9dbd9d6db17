use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn doctor_routes(state: AppState) -> Router {
    Router::new()
        // Specializations
        .route(
            "/specializations",
            get(handlers::list_specializations).post(handlers::create_specialization),
        )
        .route(
            "/specializations/{id}",
            get(handlers::get_specialization)
                .put(handlers::update_specialization)
                .delete(handlers::delete_specialization),
        )
        // Doctor profiles
        .route("/", get(handlers::list_doctors).post(handlers::create_doctor))
        .route(
            "/{doctor_id}",
            get(handlers::get_doctor)
                .put(handlers::update_doctor)
                .delete(handlers::delete_doctor),
        )
        // Availability windows
        .route(
            "/{doctor_id}/availability",
            get(handlers::list_availability).post(handlers::create_availability),
        )
        .route("/{doctor_id}/availability/bulk", post(handlers::create_bulk_availability))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
