//! Per-route authentication and authorization.
//!
//! `GuardLayer` is attached with `route_layer` and carries the route's
//! accepted audiences and its `Policy`. Each audience is tried on its own:
//! the request is admitted as soon as one audience both authenticates and
//! authorizes the caller. The admitted `Principal` lands in the request
//! extensions.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use tower::{Layer, Service};

use crate::auth::audience::{Audience, Audiences, is_admin_panel_request};
use crate::auth::extractor::Principal;
use crate::auth::policy::{OwnershipCheck, Policy, RoleSet, check_ownership, check_roles};
use crate::error::AppError;
use crate::state::{AppState, SharedState};

#[derive(Clone)]
pub struct GuardLayer {
    state: SharedState,
    audiences: Audiences,
    policy: Policy,
}

impl GuardLayer {
    pub fn new(state: SharedState, audiences: Audiences, policy: Policy) -> Self {
        Self {
            state,
            audiences,
            policy,
        }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            state: self.state.clone(),
            audiences: self.audiences,
            policy: self.policy,
        }
    }
}

#[derive(Clone)]
pub struct GuardService<S> {
    inner: S,
    state: SharedState,
    audiences: Audiences,
    policy: Policy,
}

impl<S> Service<Request<Body>> for GuardService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let state = self.state.clone();
        let audiences = self.audiences;
        let policy = self.policy;

        Box::pin(async move {
            if policy == Policy::Public {
                let resp = inner
                    .call(req)
                    .await
                    .unwrap_or_else(|infallible| match infallible {});
                return Ok(resp.into_response());
            }

            let (mut parts, body) = req.into_parts();
            match admit(&state, audiences, policy, &mut parts).await {
                Ok(principal) => {
                    parts.extensions.insert(principal);
                    let resp = inner
                        .call(Request::from_parts(parts, body))
                        .await
                        .unwrap_or_else(|infallible| match infallible {});
                    Ok(resp.into_response())
                }
                Err(err) => {
                    tracing::debug!("{} {} denied: {err}", parts.method, parts.uri.path());
                    Ok(err.into_response())
                }
            }
        })
    }
}

/// Try each participating audience; an authorization failure outranks an
/// authentication failure in the final answer.
async fn admit(
    state: &AppState,
    audiences: Audiences,
    policy: Policy,
    parts: &mut Parts,
) -> Result<Principal, AppError> {
    let admin_panel = is_admin_panel_request(
        &parts.uri,
        &parts.headers,
        state.config.admin_panel_url.as_deref(),
    );
    let target = path_id(parts).await;

    let mut failure: Option<AppError> = None;

    for &audience in audiences.members() {
        if audience.requires_admin_panel() && !admin_panel {
            continue;
        }

        let principal = match authenticate(state, audience, &parts.headers).await {
            Ok(principal) => principal,
            Err(err) if err.is_unauthorized() => {
                failure.get_or_insert(err);
                continue;
            }
            Err(err) => return Err(err),
        };

        match authorize(state, audience, policy, &principal, target.as_deref()).await {
            Ok(()) => return Ok(principal),
            Err(err) => {
                if failure.as_ref().is_none_or(AppError::is_unauthorized) {
                    failure = Some(err);
                }
            }
        }
    }

    Err(failure
        .unwrap_or_else(|| AppError::Unauthorized("Missing authentication token".to_string())))
}

async fn path_id(parts: &mut Parts) -> Option<String> {
    let params = RawPathParams::from_request_parts(parts, &()).await.ok()?;
    params
        .iter()
        .find(|(key, _)| *key == "id")
        .map(|(_, value)| value.to_string())
}

/// The audience's cookie wins over an `Authorization: Bearer` header.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn authenticate(
    state: &AppState,
    audience: Audience,
    headers: &HeaderMap,
) -> Result<Principal, AppError> {
    let token = extract_token(headers, audience.cookie_name())
        .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;

    let claims = state.tokens.verify(audience.token_kind(), &token)?;

    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    // Role or e-mail changed since issue.
    if !claims.matches(&user) {
        return Err(AppError::Unauthorized("Invalid or expired token".to_string()));
    }

    Ok(Principal {
        user_id: user.id,
        email: user.email,
        role: user.role,
        email_verified: user.email_verified,
        audience,
    })
}

async fn authorize(
    state: &AppState,
    audience: Audience,
    policy: Policy,
    principal: &Principal,
    target: Option<&str>,
) -> Result<(), AppError> {
    match policy {
        Policy::Public => Ok(()),
        Policy::Roles(allowed) => check_roles(allowed, principal.role),
        Policy::Ownership { privileged } => {
            let privileged = privileged.union(RoleSet::of(audience.ownership_bypass()));
            match check_ownership(principal.user_id, principal.role, target, privileged)? {
                OwnershipCheck::Owner => Ok(()),
                OwnershipCheck::Privileged(id) => {
                    if state.store.find_user_by_id(id).await?.is_none() {
                        return Err(AppError::NotFound("User not found".to_string()));
                    }
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::jwt::TokenKind;
    use crate::auth::service::tests::test_state;
    use crate::db::{MemoryStore, UserStore};
    use crate::models::{NewUser, Role, User};

    async fn whoami(principal: Principal) -> String {
        format!("{}:{:?}", principal.user_id, principal.audience)
    }

    fn app(state: SharedState, audiences: Audiences, policy: Policy) -> Router {
        Router::new()
            .route(
                "/api/v1/user/{id}",
                get(whoami).route_layer(GuardLayer::new(state.clone(), audiences, policy)),
            )
            .route(
                "/api/v1/admin/users/{id}",
                get(whoami).route_layer(GuardLayer::new(state, audiences, policy)),
            )
    }

    async fn user(store: &MemoryStore, email: &str, role: Role) -> User {
        let user = store
            .create_user(NewUser::local(email, "u", "hash".to_string()))
            .await
            .unwrap();
        store.set_role(user.id, role).await.unwrap().unwrap()
    }

    fn shared() -> (Arc<MemoryStore>, SharedState) {
        let (store, state) = test_state();
        (store, Arc::new(state))
    }

    async fn send(app: Router, uri: &str, headers: &[(&str, String)]) -> StatusCode {
        let mut req = Request::builder().uri(uri);
        for (name, value) in headers {
            req = req.header(*name, value.as_str());
        }
        app.oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("authorization", format!("Bearer {token}"))
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (_, state) = shared();
        let app = app(state, Audiences::Client, Policy::any_role());
        let id = Uuid::now_v7();
        assert_eq!(
            send(app, &format!("/api/v1/user/{id}"), &[]).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn cookie_and_bearer_both_work() {
        let (store, state) = shared();
        let me = user(&store, "me@x.com", Role::Customer).await;
        let token = state.tokens.issue(TokenKind::Access, &me).unwrap();
        let uri = format!("/api/v1/user/{}", me.id);
        let policy = Policy::ownership(&[]);

        let cookie = ("cookie", format!("accessToken={token}"));
        assert_eq!(
            send(app(state.clone(), Audiences::Client, policy), &uri, &[cookie]).await,
            StatusCode::OK
        );
        assert_eq!(
            send(app(state, Audiences::Client, policy), &uri, &[bearer(&token)]).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn ownership_rejects_strangers_and_admits_privileged_roles() {
        let (store, state) = shared();
        let me = user(&store, "me@x.com", Role::Customer).await;
        let other = user(&store, "other@x.com", Role::Customer).await;
        let manager = user(&store, "boss@x.com", Role::Manager).await;
        let policy = Policy::ownership(&[Role::Manager]);
        let uri = format!("/api/v1/user/{}", other.id);

        let mine = state.tokens.issue(TokenKind::Access, &me).unwrap();
        assert_eq!(
            send(app(state.clone(), Audiences::Client, policy), &uri, &[bearer(&mine)]).await,
            StatusCode::FORBIDDEN
        );

        let boss = state.tokens.issue(TokenKind::Access, &manager).unwrap();
        assert_eq!(
            send(app(state.clone(), Audiences::Client, policy), &uri, &[bearer(&boss)]).await,
            StatusCode::OK
        );

        let missing = format!("/api/v1/user/{}", Uuid::now_v7());
        assert_eq!(
            send(app(state.clone(), Audiences::Client, policy), &missing, &[bearer(&boss)]).await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            send(app(state, Audiences::Client, policy), "/api/v1/user/nope", &[bearer(&boss)])
                .await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn stale_claims_are_rejected() {
        let (store, state) = shared();
        let me = user(&store, "me@x.com", Role::Manager).await;
        let token = state.tokens.issue(TokenKind::Access, &me).unwrap();
        store.set_role(me.id, Role::Customer).await.unwrap();

        let uri = format!("/api/v1/user/{}", me.id);
        assert_eq!(
            send(app(state, Audiences::Client, Policy::any_role()), &uri, &[bearer(&token)])
                .await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn role_check_and_admin_override() {
        let (store, state) = shared();
        let customer = user(&store, "c@x.com", Role::Customer).await;
        let admin = user(&store, "a@x.com", Role::Admin).await;
        let policy = Policy::roles(&[Role::Manager]);
        let uri = format!("/api/v1/admin/users/{}", customer.id);

        let c = state.tokens.issue(TokenKind::Admin, &customer).unwrap();
        assert_eq!(
            send(app(state.clone(), Audiences::Admin, policy), &uri, &[bearer(&c)]).await,
            StatusCode::FORBIDDEN
        );

        let a = state.tokens.issue(TokenKind::Admin, &admin).unwrap();
        assert_eq!(
            send(app(state, Audiences::Admin, policy), &uri, &[bearer(&a)]).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn admin_tokens_are_ignored_outside_the_admin_panel() {
        let (store, state) = shared();
        let admin = user(&store, "a@x.com", Role::Admin).await;
        let target = user(&store, "t@x.com", Role::Customer).await;
        let token = state.tokens.issue(TokenKind::Admin, &admin).unwrap();
        let uri = format!("/api/v1/user/{}", target.id);
        let policy = Policy::ownership(&[]);

        assert_eq!(
            send(app(state.clone(), Audiences::Either, policy), &uri, &[bearer(&token)]).await,
            StatusCode::UNAUTHORIZED
        );

        let from_panel = ("origin", "https://admin.shop.test".to_string());
        assert_eq!(
            send(
                app(state.clone(), Audiences::Either, policy),
                &uri,
                &[bearer(&token), from_panel.clone()]
            )
            .await,
            StatusCode::OK
        );

        // Client-only routes never consult the admin secret.
        assert_eq!(
            send(app(state, Audiences::Client, policy), &uri, &[bearer(&token), from_panel]).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn client_tokens_do_not_pass_admin_routes() {
        let (store, state) = shared();
        let admin = user(&store, "a@x.com", Role::Admin).await;
        let token = state.tokens.issue(TokenKind::Access, &admin).unwrap();
        let uri = format!("/api/v1/admin/users/{}", admin.id);

        assert_eq!(
            send(app(state, Audiences::Admin, Policy::any_role()), &uri, &[bearer(&token)]).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn authorization_failure_outranks_authentication_failure() {
        let (store, state) = shared();
        let me = user(&store, "me@x.com", Role::Customer).await;
        let other = user(&store, "o@x.com", Role::Customer).await;
        let token = state.tokens.issue(TokenKind::Access, &me).unwrap();
        let uri = format!("/api/v1/user/{}", other.id);

        // The admin audience participates (panel origin) but finds no admin token.
        let from_panel = ("origin", "https://admin.shop.test".to_string());
        let cookie = ("cookie", format!("accessToken={token}"));
        assert_eq!(
            send(
                app(state, Audiences::Either, Policy::ownership(&[])),
                &uri,
                &[cookie, from_panel]
            )
            .await,
            StatusCode::FORBIDDEN
        );
    }
}
