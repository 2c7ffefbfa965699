use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::SharedState;

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/chat/send", post(api::send_message))
        .route(
            "/chat/conversations",
            get(api::list_conversations).post(api::create_conversation),
        )
        .route(
            "/chat/conversations/{id}",
            get(api::get_conversation).delete(api::delete_conversation),
        )
        .route("/chat/media", post(api::register_media))
        .route("/tools", get(api::list_tools))
        .route("/tools/call", post(api::call_tool))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
}
