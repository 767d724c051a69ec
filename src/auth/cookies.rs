use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::auth::jwt::{TokenKind, TokenPair};

pub const OAUTH_STATE_COOKIE: &str = "oauthState";

fn lifetime(kind: TokenKind) -> time::Duration {
    time::Duration::seconds(kind.lifetime().num_seconds())
}

/// The access cookie stays readable by the storefront's scripts.
pub fn token_cookie(kind: TokenKind, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((kind.cookie_name(), value))
        .path("/")
        .http_only(kind != TokenKind::Access)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(lifetime(kind))
        .build()
}

pub fn session_cookies(jar: CookieJar, pair: &TokenPair, secure: bool) -> CookieJar {
    jar.add(token_cookie(
        TokenKind::Access,
        pair.access_token.clone(),
        secure,
    ))
    .add(token_cookie(
        TokenKind::Refresh,
        pair.refresh_token.clone(),
        secure,
    ))
}

fn expired(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build()
}

pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.add(expired(TokenKind::Access.cookie_name()))
        .add(expired(TokenKind::Refresh.cookie_name()))
}

pub fn clear_admin_cookie(jar: CookieJar) -> CookieJar {
    jar.add(expired(TokenKind::Admin.cookie_name()))
}

pub fn oauth_state_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(10))
        .build()
}

pub fn clear_oauth_state(jar: CookieJar) -> CookieJar {
    jar.add(expired(OAUTH_STATE_COOKIE))
}
