use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::*;
use crate::state::AppointmentState;

pub fn appointment_routes(state: AppointmentState) -> Router {
    Router::new()
        .route("/", get(list_appointments).post(create_appointment))
        .route("/{id}", get(get_appointment).put(update_appointment))
        .route("/{id}/status", patch(update_appointment_status))
        .layer(middleware::from_fn_with_state(state.app.config.clone(), auth_middleware))
        .with_state(state)
}
