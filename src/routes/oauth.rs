use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::auth::cookies::{OAUTH_STATE_COOKIE, clear_oauth_state, oauth_state_cookie, session_cookies};
use crate::auth::federated::{self, ExternalProfile};
use crate::auth::oauth::{OAuthClient, PendingLogin, Provider};
use crate::error::AppError;
use crate::state::{AppState, SharedState};

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn provider_client<'a>(state: &'a AppState, provider: &str) -> Result<&'a OAuthClient, AppError> {
    provider
        .parse::<Provider>()
        .ok()
        .and_then(|p| state.oauth(p))
        .ok_or_else(|| AppError::NotFound("Login provider not available".to_string()))
}

/// Send the browser to the provider's consent screen.
pub async fn start(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let client = provider_client(&state, &provider)?;
    let pending = PendingLogin::new(client.provider());

    let jar = jar.add(oauth_state_cookie(
        pending.to_cookie_value(),
        state.config.secure_cookies,
    ));
    Ok((jar, Redirect::to(&client.authorize_url(&pending))))
}

pub async fn callback(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let client = provider_client(&state, &provider)?;

    let pending = jar
        .get(OAUTH_STATE_COOKIE)
        .and_then(|c| PendingLogin::from_cookie_value(c.value()));
    let jar = clear_oauth_state(jar);

    let profile = fetch_profile(&state, client, pending, params).await;
    let (_, pair) = federated::sign_in_federated(&state, profile).await?;

    let jar = session_cookies(jar, &pair, state.config.secure_cookies);
    Ok((jar, Redirect::to(&state.config.client_url)))
}

/// Any failure on the provider side collapses to "no profile".
async fn fetch_profile(
    state: &AppState,
    client: &OAuthClient,
    pending: Option<PendingLogin>,
    params: CallbackParams,
) -> Option<ExternalProfile> {
    if let Some(error) = params.error {
        tracing::warn!("{} login refused: {error}", client.provider());
        return None;
    }

    let pending = pending.filter(|p| p.provider == client.provider())?;
    if params.state.as_deref() != Some(pending.state.as_str()) {
        tracing::warn!("{} login state mismatch", client.provider());
        return None;
    }

    let code = params.code?;
    let result = async {
        let access_token = client
            .exchange_code(&state.http, &code, &pending.verifier)
            .await?;
        client.fetch_profile(&state.http, &access_token).await
    }
    .await;

    match result {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}
