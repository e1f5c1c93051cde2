//! HTTP handlers for the KubeFleet Control Plane API.
//!
//! Handlers validate, call a service or the task engine and map errors
//! through `AppError`'s `IntoResponse`.

pub mod accounts;
pub mod health;
pub mod kubes;
pub mod tasks;

use axum::{
    routing::{get, post},
    Router,
};

use crate::services::AccountService;
use crate::state::AppState;

pub use health::health_check;

/// All API routes, without middleware.
pub fn router(state: AppState, account_service: AccountService) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(state.clone());

    let kube_routes = Router::new()
        .route("/kubes", post(kubes::create).get(kubes::list))
        .route("/kubes/{kname}", get(kubes::get).delete(kubes::delete))
        .route("/kubes/{kname}/tasks", get(kubes::tasks))
        .route("/kubes/{kname}/nodes", post(kubes::add_nodes))
        .route(
            "/kubes/{kname}/nodes/{node}",
            axum::routing::delete(kubes::delete_node),
        )
        .route(
            "/kubes/{kname}/certs/{cname}",
            get(kubes::get_certs).put(kubes::put_certs),
        )
        .with_state(state.clone());

    let task_routes = Router::new()
        .route("/tasks/{id}", get(tasks::get))
        .with_state(state.engine.tasks().clone());

    let account_routes = Router::new()
        .route("/accounts", post(accounts::create).get(accounts::list))
        .route("/accounts/{name}", get(accounts::get))
        .with_state(account_service);

    Router::new()
        .merge(health_routes)
        .merge(kube_routes)
        .merge(task_routes)
        .merge(account_routes)
}
