use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

pub mod access;
pub mod cases;
pub mod documents;
pub mod health;
pub mod parties;
pub mod public;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let cases_routes = Router::new()
        .route("/", get(cases::list_cases).post(cases::create_case))
        .route("/:id", get(cases::get_case).patch(cases::update_case))
        .route("/:id/assign", post(cases::assign_case))
        .route("/:id/route", post(cases::route_case))
        .route("/:id/pendency/accept", post(cases::accept_pendency))
        .route("/:id/pendency/refuse", post(cases::refuse_pendency))
        .route("/:id/archive", post(cases::archive_case))
        .route("/:id/priority", post(cases::prioritize_case))
        .route("/:id/events", get(cases::list_routing_events))
        .route(
            "/:id/parties",
            get(cases::list_case_parties).post(cases::add_case_party),
        )
        .route("/:id/parties/:link_id", delete(cases::remove_case_party))
        .route("/:id/documents", get(documents::list_case_documents))
        .route("/:id/documents/link", post(documents::link_document))
        .route(
            "/:id/access",
            get(access::list_grants).post(access::add_grant),
        )
        .route("/:id/access/:grant_id", delete(access::remove_grant));

    let documents_routes = Router::new()
        .route("/", post(documents::create_document))
        .route("/:id", get(documents::get_document))
        .route("/:id/upload", post(documents::upload_content))
        .route("/:id/editor", post(documents::editor_content))
        .route("/:id/sign", post(documents::sign_document))
        .route("/:id/delete", post(documents::delete_draft));

    let parties_routes = Router::new()
        .route("/", get(parties::list_parties).post(parties::create_party))
        .route(
            "/:id",
            get(parties::get_party)
                .patch(parties::update_party)
                .delete(parties::delete_party),
        )
        .route("/:id/key", post(parties::rotate_access_key))
        .route("/:id/key/revoke", post(parties::revoke_access_key));

    let users_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/upsert", post(users::upsert_user));

    let public_routes = Router::new()
        .route("/cases/:value", get(public::lookup_case))
        .route("/documents/:id/content", get(public::document_content));

    Router::new()
        .nest("/api/cases", cases_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/parties", parties_routes)
        .nest("/api/users", users_routes)
        .nest("/api/public", public_routes)
        .route("/api/departments", get(users::list_departments))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
