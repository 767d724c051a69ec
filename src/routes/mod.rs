pub mod admin;
pub mod auth;
pub mod oauth;
pub mod user;

use axum::Router;
use axum::routing::{get, patch, post};

use crate::auth::audience::Audiences;
use crate::auth::guard::GuardLayer;
use crate::auth::policy::Policy;
use crate::models::Role;
use crate::state::SharedState;

pub fn api_routes(state: &SharedState) -> Router<SharedState> {
    let guard = |audiences, policy| GuardLayer::new(state.clone(), audiences, policy);

    Router::new()
        // Storefront auth
        .route("/api/v1/auth/sign-up", post(auth::sign_up))
        .route("/api/v1/auth/sign-in", post(auth::sign_in))
        .route(
            "/api/v1/auth/log-out",
            post(auth::log_out).route_layer(guard(Audiences::Client, Policy::any_role())),
        )
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/password/reset", post(auth::reset_password))
        .route("/api/v1/auth/{provider}", get(oauth::start))
        .route("/api/v1/auth/{provider}/callback", get(oauth::callback))
        // Accounts
        .route(
            "/api/v1/user/{id}",
            get(user::get)
                .route_layer(guard(
                    Audiences::Either,
                    Policy::ownership(&[Role::Manager, Role::Admin]),
                ))
                .merge(
                    patch(user::update)
                        .delete(user::delete)
                        .route_layer(guard(Audiences::Either, Policy::ownership(&[Role::Admin]))),
                ),
        )
        .route(
            "/api/v1/user/{id}/email/verify/send",
            post(user::send_verification_code)
                .route_layer(guard(Audiences::Client, Policy::ownership(&[]))),
        )
        .route(
            "/api/v1/user/{id}/email/verify",
            patch(user::verify_email).route_layer(guard(Audiences::Client, Policy::ownership(&[]))),
        )
        .route(
            "/api/v1/user/{id}/password/reset",
            post(user::request_password_reset)
                .route_layer(guard(Audiences::Client, Policy::ownership(&[]))),
        )
        // Admin panel
        .route("/api/v1/admin/auth/sign-in", post(admin::sign_in))
        .route(
            "/api/v1/admin/auth/log-out",
            post(admin::log_out).route_layer(guard(Audiences::Admin, Policy::any_role())),
        )
        .route(
            "/api/v1/admin/users",
            get(admin::list_users)
                .route_layer(guard(Audiences::Admin, Policy::roles(&[Role::Manager]))),
        )
        .route(
            "/api/v1/admin/users/{id}/role",
            patch(admin::change_role)
                .route_layer(guard(Audiences::Admin, Policy::roles(&[Role::Admin]))),
        )
}
