use axum::http::{HeaderMap, Uri, header};

use crate::auth::jwt::TokenKind;
use crate::models::Role;

pub const ADMIN_API_PREFIX: &str = "/api/v1/admin";

/// Who a token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Client,
    Admin,
}

impl Audience {
    pub fn token_kind(self) -> TokenKind {
        match self {
            Audience::Client => TokenKind::Access,
            Audience::Admin => TokenKind::Admin,
        }
    }

    pub fn cookie_name(self) -> &'static str {
        self.token_kind().cookie_name()
    }

    /// Admin tokens are only honoured on admin-panel requests.
    pub fn requires_admin_panel(self) -> bool {
        matches!(self, Audience::Admin)
    }

    /// Roles that pass any ownership check under this audience.
    pub fn ownership_bypass(self) -> &'static [Role] {
        match self {
            Audience::Client => &[],
            Audience::Admin => &[Role::Admin],
        }
    }
}

/// Which audiences a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audiences {
    Client,
    Admin,
    Either,
}

impl Audiences {
    pub fn members(self) -> &'static [Audience] {
        match self {
            Audiences::Client => &[Audience::Client],
            Audiences::Admin => &[Audience::Admin],
            Audiences::Either => &[Audience::Client, Audience::Admin],
        }
    }
}

/// A request counts as coming from the admin panel when it targets the admin
/// API, or its `Origin`/`Referer` starts with the admin panel URL.
pub fn is_admin_panel_request(uri: &Uri, headers: &HeaderMap, admin_panel_url: Option<&str>) -> bool {
    let path = uri.path();
    if path == ADMIN_API_PREFIX || path.starts_with(&format!("{ADMIN_API_PREFIX}/")) {
        return true;
    }

    let Some(panel) = admin_panel_url.filter(|u| !u.is_empty()) else {
        return false;
    };

    [header::ORIGIN, header::REFERER].iter().any(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(panel))
    })
}
