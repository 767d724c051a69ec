use std::sync::Arc;

use crate::auth::jwt::TokenIssuer;
use crate::auth::oauth::{OAuthClient, Provider};
use crate::config::Config;
use crate::db::UserStore;
use crate::email::Mailer;
use crate::rate_limit::LoginRateLimiter;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Config,
    pub tokens: TokenIssuer,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub login_limiter: LoginRateLimiter,
    pub google: Option<OAuthClient>,
    pub twitter: Option<OAuthClient>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore>, mailer: Option<Arc<dyn Mailer>>, config: Config) -> Self {
        let google = config
            .google
            .as_ref()
            .map(|c| OAuthClient::new(Provider::Google, c, &config.base_url));
        let twitter = config
            .twitter
            .as_ref()
            .map(|c| OAuthClient::new(Provider::Twitter, c, &config.base_url));

        Self {
            store,
            tokens: TokenIssuer::new(&config.secrets),
            mailer,
            login_limiter: LoginRateLimiter::new(),
            google,
            twitter,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn oauth(&self, provider: Provider) -> Option<&OAuthClient> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Twitter => self.twitter.as_ref(),
        }
    }
}
