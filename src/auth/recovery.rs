//! Transparent session recovery.
//!
//! When a storefront request comes back `401`, the filter rotates the
//! caller's refresh token and replays the buffered request once with the new
//! access token. The renewed cookies ride along on whatever the replay
//! returns.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use tower::{Layer, Service, ServiceExt};

use crate::auth::audience::is_admin_panel_request;
use crate::auth::cookies::token_cookie;
use crate::auth::jwt::{TokenKind, TokenPair};
use crate::auth::service;
use crate::error::AppError;
use crate::state::SharedState;

pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Clone)]
pub struct RecoveryLayer {
    state: SharedState,
}

impl RecoveryLayer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RecoveryService<S> {
    inner: S,
    state: SharedState,
}

impl<S> Service<Request<Body>> for RecoveryService<S>
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
        let replay = self.inner.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = self.state.clone();

        Box::pin(async move {
            let bypass = req.uri().path() == REFRESH_PATH
                || is_admin_panel_request(
                    req.uri(),
                    req.headers(),
                    state.config.admin_panel_url.as_deref(),
                );
            if bypass {
                let resp = inner
                    .call(req)
                    .await
                    .unwrap_or_else(|infallible| match infallible {});
                return Ok(resp.into_response());
            }

            let (parts, body) = req.into_parts();
            let bytes = match to_bytes(body, state.config.max_body_size).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    return Ok(
                        AppError::PayloadTooLarge("Request body too large".to_string())
                            .into_response(),
                    );
                }
            };

            let method = parts.method.clone();
            let uri = parts.uri.clone();
            let version = parts.version;
            let headers = parts.headers.clone();
            let extensions = parts.extensions.clone();

            let first = inner
                .call(Request::from_parts(parts, Body::from(bytes.clone())))
                .await
                .unwrap_or_else(|infallible| match infallible {})
                .into_response();

            if first.status() != StatusCode::UNAUTHORIZED {
                return Ok(first);
            }

            let jar = CookieJar::from_headers(&headers);
            let Some(raw) = jar
                .get(TokenKind::Refresh.cookie_name())
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
            else {
                return Ok(
                    AppError::Unauthorized("Refresh token is not provided".to_string())
                        .into_response(),
                );
            };

            let pair = match service::refresh(&state, &raw).await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::debug!("Session recovery for {} failed: {err}", uri.path());
                    return Ok(err.into_response());
                }
            };

            tracing::debug!("Session recovered, replaying {method} {}", uri.path());

            let mut retry = Request::new(Body::from(bytes));
            *retry.method_mut() = method;
            *retry.uri_mut() = uri;
            *retry.version_mut() = version;
            *retry.headers_mut() = with_tokens(headers, &pair);
            *retry.extensions_mut() = extensions;

            let mut response = replay
                .oneshot(retry)
                .await
                .unwrap_or_else(|infallible| match infallible {})
                .into_response();

            // A handler that wrote a session cookie itself (log-out) has the last word.
            let written = cookies_written(&response);
            for (kind, value) in [
                (TokenKind::Access, pair.access_token),
                (TokenKind::Refresh, pair.refresh_token),
            ] {
                if written.iter().any(|name| name == kind.cookie_name()) {
                    continue;
                }
                let cookie = token_cookie(kind, value, state.config.secure_cookies);
                if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }

            Ok(response)
        })
    }
}

/// Names of the cookies a response sets or clears.
fn cookies_written(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split_once('=').map(|(name, _)| name.trim().to_string()))
        .collect()
}

/// Swap the token cookies for the renewed pair and add a matching bearer header.
fn with_tokens(mut headers: HeaderMap, pair: &TokenPair) -> HeaderMap {
    let access = TokenKind::Access.cookie_name();
    let refresh = TokenKind::Refresh.cookie_name();

    let jar = CookieJar::from_headers(&headers);
    let mut pairs: Vec<String> = jar
        .iter()
        .filter(|c| c.name() != access && c.name() != refresh)
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect();
    pairs.push(format!("{access}={}", pair.access_token));
    pairs.push(format!("{refresh}={}", pair.refresh_token));

    headers.remove(header::COOKIE);
    if let Ok(value) = HeaderValue::from_str(&pairs.join("; ")) {
        headers.insert(header::COOKIE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", pair.access_token)) {
        headers.insert(header::AUTHORIZATION, value);
    }
    headers
}
