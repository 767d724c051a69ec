use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenSecrets;
use crate::error::AppError;
use crate::models::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    Admin,
}

impl TokenKind {
    pub fn lifetime(self) -> Duration {
        match self {
            TokenKind::Access | TokenKind::Admin => Duration::minutes(30),
            TokenKind::Refresh => Duration::days(7),
        }
    }

    pub fn audience(self) -> &'static str {
        match self {
            TokenKind::Access => "storefront",
            TokenKind::Refresh => "storefront-refresh",
            TokenKind::Admin => "admin-panel",
        }
    }

    pub fn cookie_name(self) -> &'static str {
        match self {
            TokenKind::Access => "accessToken",
            TokenKind::Refresh => "refreshToken",
            TokenKind::Admin => "adminToken",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
    pub aud: String,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(kind: TokenKind, user: &User, now: DateTime<Utc>) -> Self {
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            email_verified: user.email_verified,
            aud: kind.audience().to_string(),
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + kind.lifetime()).timestamp(),
        }
    }

    /// Whether the claims still describe the stored row.
    pub fn matches(&self, user: &User) -> bool {
        self.sub == user.id
            && self.email == user.email
            && self.role == user.role
            && self.email_verified == user.email_verified
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies the three token flavours, each with its own secret.
pub struct TokenIssuer {
    access: Keys,
    refresh: Keys,
    admin: Keys,
}

impl TokenIssuer {
    pub fn new(secrets: &TokenSecrets) -> Self {
        Self {
            access: Keys::new(&secrets.access),
            refresh: Keys::new(&secrets.refresh),
            admin: Keys::new(&secrets.admin),
        }
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::Admin => &self.admin,
        }
    }

    pub fn issue(&self, kind: TokenKind, user: &User) -> Result<String, AppError> {
        self.issue_at(kind, user, Utc::now())
    }

    pub fn issue_at(
        &self,
        kind: TokenKind,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims::new(kind, user, now);
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| AppError::Internal(format!("JWT encode failed: {e}")))
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.issue_at(TokenKind::Access, user, now)?,
            refresh_token: self.issue_at(TokenKind::Refresh, user, now)?,
        })
    }

    pub fn issue_admin(&self, user: &User) -> Result<String, AppError> {
        self.issue(TokenKind::Admin, user)
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, AppError> {
        self.verify_at(kind, token, Utc::now())
    }

    /// Check signature and audience for `kind`, then expiry against `now`.
    pub fn verify_at(
        &self,
        kind: TokenKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_audience(&[kind.audience()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("{kind:?} token rejected: {e}");
                AppError::Unauthorized("Invalid or expired token".to_string())
            })?;

        if claims.is_expired_at(now) {
            return Err(AppError::Unauthorized("Invalid or expired token".to_string()));
        }

        Ok(claims)
    }

    /// Read claims without checking signature, audience or expiry.
    pub fn decode_unverified(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("Malformed token".to_string()))
    }
}
