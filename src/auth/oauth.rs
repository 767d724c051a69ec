use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::auth::federated::ExternalProfile;
use crate::auth::tokens::generate_opaque_token;
use crate::config::OAuthClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Twitter,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Twitter => "twitter",
        }
    }

    fn authorize_endpoint(self) -> &'static str {
        match self {
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Provider::Twitter => "https://twitter.com/i/oauth2/authorize",
        }
    }

    fn token_endpoint(self) -> &'static str {
        match self {
            Provider::Google => "https://oauth2.googleapis.com/token",
            Provider::Twitter => "https://api.twitter.com/2/oauth2/token",
        }
    }

    fn profile_endpoint(self) -> &'static str {
        match self {
            Provider::Google => "https://www.googleapis.com/oauth2/v3/userinfo",
            Provider::Twitter => {
                "https://api.twitter.com/2/users/me?user.fields=profile_image_url,confirmed_email"
            }
        }
    }

    fn scope(self) -> &'static str {
        match self {
            Provider::Google => "openid email profile",
            Provider::Twitter => "users.read tweet.read users.email",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "twitter" => Ok(Provider::Twitter),
            other => Err(format!("Unknown OAuth provider: {other}")),
        }
    }
}

/// CSRF state plus PKCE verifier, kept in a short-lived cookie between the
/// redirect to the provider and the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub provider: Provider,
    pub state: String,
    pub verifier: String,
}

impl PendingLogin {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: generate_opaque_token(),
            verifier: generate_opaque_token(),
        }
    }

    pub fn to_cookie_value(&self) -> String {
        format!("{}.{}.{}", self.provider, self.state, self.verifier)
    }

    pub fn from_cookie_value(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, '.');
        let provider = parts.next()?.parse().ok()?;
        let state = parts.next()?.to_string();
        let verifier = parts.next()?.to_string();
        if state.is_empty() || verifier.is_empty() {
            return None;
        }
        Some(Self {
            provider,
            state,
            verifier,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwitterEnvelope {
    data: TwitterUser,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    id: String,
    name: Option<String>,
    username: Option<String>,
    profile_image_url: Option<String>,
    confirmed_email: Option<String>,
}

/// Authorization-code client for one provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: Provider,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(provider: Provider, config: &OAuthClientConfig, base_url: &str) -> Self {
        Self {
            provider,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: format!(
                "{}/api/v1/auth/{}/callback",
                base_url.trim_end_matches('/'),
                provider
            ),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Plain PKCE: the challenge is the verifier itself.
    pub fn authorize_url(&self, pending: &PendingLogin) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", self.provider.scope())
            .append_pair("state", &pending.state)
            .append_pair("code_challenge", &pending.verifier)
            .append_pair("code_challenge_method", "plain")
            .finish();
        format!("{}?{query}", self.provider.authorize_endpoint())
    }

    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
        verifier: &str,
    ) -> Result<String, String> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", verifier),
        ];

        let mut request = http.post(self.provider.token_endpoint());
        match self.provider {
            Provider::Google => form.push(("client_secret", self.client_secret.as_str())),
            Provider::Twitter => {
                request = request.basic_auth(&self.client_id, Some(&self.client_secret));
            }
        }
        let request = request.form(&form);

        let response = request
            .send()
            .await
            .map_err(|e| format!("{} token request failed: {e}", self.provider))?;

        if !response.status().is_success() {
            return Err(format!(
                "{} token endpoint returned {}",
                self.provider,
                response.status()
            ));
        }

        response
            .json::<TokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| format!("{} token response malformed: {e}", self.provider))
    }

    pub async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<ExternalProfile, String> {
        let response = http
            .get(self.provider.profile_endpoint())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| format!("{} profile request failed: {e}", self.provider))?;

        if !response.status().is_success() {
            return Err(format!(
                "{} profile endpoint returned {}",
                self.provider,
                response.status()
            ));
        }

        let profile = match self.provider {
            Provider::Google => {
                let info: GoogleUserInfo = response
                    .json()
                    .await
                    .map_err(|e| format!("google profile malformed: {e}"))?;
                ExternalProfile {
                    provider: Provider::Google,
                    provider_id: info.sub,
                    given_name: info.given_name,
                    family_name: info.family_name,
                    display_name: info.name,
                    email: info.email.unwrap_or_default(),
                    email_verified: info.email_verified,
                    avatar_url: info.picture,
                }
            }
            Provider::Twitter => {
                let envelope: TwitterEnvelope = response
                    .json()
                    .await
                    .map_err(|e| format!("twitter profile malformed: {e}"))?;
                let user = envelope.data;
                ExternalProfile {
                    provider: Provider::Twitter,
                    provider_id: user.id,
                    given_name: None,
                    family_name: None,
                    display_name: user.name.or(user.username),
                    // Twitter only returns addresses it has confirmed.
                    email_verified: user.confirmed_email.is_some(),
                    email: user.confirmed_email.unwrap_or_default(),
                    avatar_url: user.profile_image_url,
                }
            }
        };

        Ok(profile)
    }
}
