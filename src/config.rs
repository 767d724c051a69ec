use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub secrets: TokenSecrets,
    pub host: IpAddr,
    pub port: u16,
    /// Public URL of this API, used for OAuth callbacks.
    pub base_url: String,
    /// Storefront origin; OAuth logins land here and reset links point here.
    pub client_url: String,
    /// Origin of the admin panel. Requests from it use the admin audience.
    pub admin_panel_url: Option<String>,
    pub max_body_size: usize,
    pub secure_cookies: bool,
    pub sweep_interval: Duration,
    pub log_level: String,
    pub smtp: Option<SmtpConfig>,
    pub google: Option<OAuthClientConfig>,
    pub twitter: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone)]
pub struct TokenSecrets {
    pub access: String,
    pub refresh: String,
    pub admin: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let secrets = TokenSecrets {
            access: env_required("ACCESS_TOKEN_SECRET")?,
            refresh: env_required("REFRESH_TOKEN_SECRET")?,
            admin: env_required("ADMIN_TOKEN_SECRET")?,
        };
        secrets.validate()?;

        let database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let host: IpAddr = env_or("STOREFRONT_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid STOREFRONT_HOST: {e}"))?;

        let port: u16 = env_or("STOREFRONT_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid STOREFRONT_PORT: {e}"))?;

        let base_url = env_or("STOREFRONT_BASE_URL", &format!("http://{host}:{port}"));
        let client_url = env_or("CLIENT_URL", &base_url);
        let admin_panel_url = std::env::var("ADMIN_PANEL_URL").ok().filter(|s| !s.is_empty());

        let max_body_size: usize = env_or("STOREFRONT_MAX_BODY_SIZE", "1048576")
            .parse()
            .map_err(|e| format!("Invalid STOREFRONT_MAX_BODY_SIZE: {e}"))?;

        let secure_cookies = match env_or("STOREFRONT_SECURE_COOKIES", "true").as_str() {
            "false" | "0" => false,
            _ => true,
        };

        let sweep_interval_secs: u64 = env_or("SWEEP_INTERVAL_SECS", "60")
            .parse()
            .map_err(|e| format!("Invalid SWEEP_INTERVAL_SECS: {e}"))?;

        let log_level = env_or("STOREFRONT_LOG_LEVEL", "info");

        let smtp = match (
            std::env::var("STOREFRONT_SMTP_HOST").ok(),
            std::env::var("STOREFRONT_SMTP_PORT").ok(),
            std::env::var("STOREFRONT_SMTP_USER").ok(),
            std::env::var("STOREFRONT_SMTP_PASS").ok(),
            std::env::var("STOREFRONT_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid STOREFRONT_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        Ok(Config {
            database_url,
            secrets,
            host,
            port,
            base_url,
            client_url,
            admin_panel_url,
            max_body_size,
            secure_cookies,
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            log_level,
            smtp,
            google: oauth_client("GOOGLE"),
            twitter: oauth_client("TWITTER"),
        })
    }
}

impl TokenSecrets {
    /// Every audience must sign with its own secret.
    pub fn validate(&self) -> Result<(), String> {
        if self.access == self.refresh || self.access == self.admin || self.refresh == self.admin {
            return Err("ACCESS, REFRESH and ADMIN token secrets must all differ".to_string());
        }
        Ok(())
    }
}

fn oauth_client(prefix: &str) -> Option<OAuthClientConfig> {
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    Some(OAuthClientConfig {
        client_id,
        client_secret,
    })
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
