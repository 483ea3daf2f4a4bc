//! Route table for the HTTP API.

use axum::routing::{delete, get, patch, post, put};
use axum::{Router, middleware as axum_middleware};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::gateway;
use crate::handlers::{
    auth, channels, invites, members, messages, roles, search, server, uploads, users,
    verify_page,
};
use crate::middleware::{require_active_member, require_auth, require_verified};
use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState, upload_limit_bytes: usize, cors_origins: &[String]) -> Router {
    // Open: no token yet.
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/mfa/verify", post(auth::verify_mfa))
        .route("/gateway", get(gateway::ws_handler));

    // Authenticated account surface; available before verification and
    // membership so a fresh account can manage itself.
    let account = Router::new()
        .route("/auth/verify-password", post(auth::verify_password))
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route("/auth/logout", post(auth::logout))
        .route("/users/@me", get(users::get_me))
        .route("/users/@me", patch(users::update_me))
        .route("/users/@me", delete(users::delete_me))
        .route("/users/@me/mfa/enable", post(users::enable_mfa))
        .route("/users/@me/mfa/confirm", post(users::confirm_mfa))
        .route("/users/@me/mfa/disable", post(users::disable_mfa))
        .route(
            "/users/@me/mfa/recovery-codes",
            post(users::regenerate_recovery_codes),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    // Verified but not necessarily a member: invite redemption.
    let verified = Router::new()
        .route("/invites/{code}/join", post(invites::join))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_verified,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    // The chat surface: verified active members only.
    let member = Router::new()
        .route("/channels", get(channels::list_channels))
        .route("/channels", post(channels::create_channel))
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route("/channels/{channel_id}", patch(channels::update_channel))
        .route("/channels/{channel_id}", delete(channels::delete_channel))
        .route("/categories", get(channels::list_categories))
        .route("/categories", post(channels::create_category))
        .route("/categories/{category_id}", patch(channels::update_category))
        .route(
            "/categories/{category_id}",
            delete(channels::delete_category),
        )
        .route(
            "/channels/{channel_id}/overrides",
            get(channels::list_overrides),
        )
        .route(
            "/channels/{channel_id}/overrides",
            put(channels::set_override),
        )
        .route(
            "/channels/{channel_id}/overrides/{target_type}/{target_id}",
            delete(channels::remove_override),
        )
        .route("/channels/{channel_id}/messages", get(messages::history))
        .route("/channels/{channel_id}/messages", post(messages::create))
        .route(
            "/channels/{channel_id}/messages/{message_id}",
            patch(messages::update),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}",
            delete(messages::delete),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}/pin",
            put(messages::pin),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}/pin",
            delete(messages::unpin),
        )
        .route("/channels/{channel_id}/pins", get(messages::pinned))
        .route("/roles", get(roles::list))
        .route("/roles", post(roles::create))
        .route("/roles/{role_id}", patch(roles::update))
        .route("/roles/{role_id}", delete(roles::delete))
        .route("/members/{user_id}/roles/{role_id}", put(roles::assign))
        .route(
            "/members/{user_id}/roles/{role_id}",
            delete(roles::unassign),
        )
        .route("/members", get(members::list))
        .route("/members/@me", patch(members::update_own_nickname))
        .route("/members/@me", delete(members::leave))
        .route("/members/{user_id}", delete(members::kick))
        .route("/bans/{user_id}", put(members::ban))
        .route("/bans/{user_id}", delete(members::unban))
        .route("/members/{user_id}/timeout", put(members::timeout))
        .route("/members/{user_id}/timeout", delete(members::clear_timeout))
        .route("/invites", get(invites::list))
        .route("/invites", post(invites::create))
        .route("/invites/{invite_id}", delete(invites::delete))
        .route("/server", get(server::get))
        .route("/server", patch(server::update))
        .route("/search/messages", get(search::messages))
        .route("/uploads", post(uploads::upload))
        .route("/attachments/{attachment_id}", get(uploads::download))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_active_member,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api = public.merge(account).merge(verified).merge(member);

    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .nest("/api/v1", api)
        .route("/verify-email", get(verify_page::verify_email_page))
        .layer(RequestBodyLimitLayer::new(upload_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
