use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/auth/register", post(api::register))
        .route("/api/auth/login", post(api::login))
        .route("/api/auth/me", get(api::me))
        .route(
            "/api/projects",
            post(api::create_project).get(api::list_projects),
        )
        .route(
            "/api/projects/{id}",
            get(api::get_project)
                .patch(api::update_project)
                .delete(api::delete_project),
        )
        .route(
            "/api/projects/{id}/chats",
            post(api::create_chat).get(api::list_chats),
        )
        .route("/api/projects/{id}/similar", post(api::find_similar_chats))
        .route(
            "/api/chats",
            post(api::save_chat).delete(api::delete_all_chats),
        )
        .route(
            "/api/chats/{id}",
            get(api::get_chat).delete(api::delete_chat),
        )
        .route("/api/chats/{id}/duplicate", post(api::duplicate_chat))
        .route("/api/chats/{id}/fork", post(api::fork_chat))
        .route(
            "/api/chats/{id}/snapshot",
            post(api::save_snapshot).get(api::latest_snapshot),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn status() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
