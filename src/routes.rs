// routes.rs
use std::time::Duration;

use axum::{
    routing::{get, patch, post},
    Router,
};
use http::{header, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, AppState};

pub fn create_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(tower_http::cors::Any)
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route(
            "/v1/polls",
            get(handlers::list_polls).post(handlers::create_poll),
        )
        .route(
            "/v1/polls/{id}",
            get(handlers::show_poll)
                .patch(handlers::update_poll)
                .delete(handlers::delete_poll),
        )
        .route(
            "/v1/polls/{id}/options",
            post(handlers::add_option).patch(handlers::reposition_options),
        )
        .route(
            "/v1/polls/{id}/options/{option_id}",
            patch(handlers::update_option).delete(handlers::delete_option),
        )
        .route(
            "/v1/polls/{id}/options/{option_id}/vote",
            post(handlers::vote),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
