/*!
 * Admin Session
 * Credential check, JWT access tokens, rotating refresh tokens, and login
 * rate limiting. One store per process, shared through application state.
 */
use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use bcrypt::verify;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::AdminCredentials;

/// Access token expiry in minutes
pub const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 15;

/// Refresh token expiry in days
pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Login attempts allowed per client IP inside one window
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

pub const ADMIN_USER_ID: &str = "studio-admin";
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
struct RefreshTokenData {
    email: String,
    expires_at: i64,
    revoked: bool,
}

/// User info returned to the front end
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub email: String,
    pub role: String,
}

impl UserInfo {
    fn admin(email: &str) -> Self {
        Self {
            user_id: ADMIN_USER_ID.to_string(),
            email: email.to_string(),
            role: ADMIN_ROLE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub user: UserInfo,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Too many requests. Please try again later.")]
    RateLimited,

    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Admin login is not configured")]
    NotConfigured,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Refresh token is required")]
    MissingRefreshToken,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Failed to create token")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to verify password")]
    PasswordCheck,
}

/// Pulls the token out of an `Authorization: Bearer ...` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Generate a random refresh token
fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// Refresh tokens are only ever stored as SHA-256 digests.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SessionStore {
    admin: Option<AdminCredentials>,
    secret: String,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenData>>,
    /// IP -> (window start, attempts in window)
    attempts: RwLock<HashMap<String, (i64, u32)>>,
}

impl SessionStore {
    pub fn new(admin: Option<AdminCredentials>, secret: impl Into<String>) -> Self {
        Self {
            admin,
            secret: secret.into(),
            refresh_tokens: RwLock::new(HashMap::new()),
            attempts: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.admin.is_some()
    }

    /// Counts one login attempt for `ip`; false once the window is used up.
    ///
    /// Entries with an expired window are evicted on every call so the map
    /// tracks active IPs only.
    async fn check_rate_limit(&self, ip: &str) -> bool {
        let now = Utc::now().timestamp();
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, (start, _)| now - *start < RATE_LIMIT_WINDOW_SECS);

        let entry = attempts.entry(ip.to_string()).or_insert((now, 0));
        if entry.1 >= MAX_LOGIN_ATTEMPTS {
            return false;
        }
        entry.1 += 1;
        true
    }

    fn create_access_token(&self, email: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES);
        let claims = Claims {
            sub: ADMIN_USER_ID.to_string(),
            email: email.to_string(),
            role: ADMIN_ROLE.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    async fn issue_refresh_token(&self, email: &str) -> String {
        let token = generate_refresh_token();
        let expires_at = (Utc::now() + Duration::days(REFRESH_TOKEN_EXPIRY_DAYS)).timestamp();
        let now = Utc::now().timestamp();

        let mut tokens = self.refresh_tokens.write().await;
        tokens.retain(|_, data| !data.revoked && data.expires_at > now);
        tokens.insert(
            hash_refresh_token(&token),
            RefreshTokenData {
                email: email.to_string(),
                expires_at,
                revoked: false,
            },
        );
        token
    }

    pub async fn login(
        &self,
        ip: &str,
        email: &str,
        password: &str,
    ) -> Result<IssuedTokens, AuthError> {
        if !self.check_rate_limit(ip).await {
            tracing::warn!(ip, "login rate limited");
            return Err(AuthError::RateLimited);
        }
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        let Some(admin) = &self.admin else {
            return Err(AuthError::NotConfigured);
        };

        // bcrypt is CPU-bound; keep it off the async workers.
        let password = password.to_string();
        let hash = admin.password_hash.clone();
        let password_ok =
            tokio::task::spawn_blocking(move || verify(&password, &hash).unwrap_or(false))
                .await
                .map_err(|_| AuthError::PasswordCheck)?;

        if !password_ok || !email.eq_ignore_ascii_case(&admin.email) {
            tracing::warn!(ip, email, "failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.create_access_token(&admin.email)?;
        let refresh_token = self.issue_refresh_token(&admin.email).await;
        tracing::info!(email = %admin.email, "admin logged in");

        Ok(IssuedTokens {
            user: UserInfo::admin(&admin.email),
            access_token,
            refresh_token,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AuthError::InvalidToken
        })?;
        Ok(data.claims)
    }

    /// Exchanges a refresh token for a new pair; the old one stops working.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingRefreshToken);
        }
        let token_hash = hash_refresh_token(refresh_token);
        let now = Utc::now().timestamp();

        let email = {
            let mut tokens = self.refresh_tokens.write().await;
            match tokens.get_mut(&token_hash) {
                Some(data) if !data.revoked && data.expires_at > now => {
                    data.revoked = true;
                    data.email.clone()
                }
                _ => return Err(AuthError::InvalidRefreshToken),
            }
        };

        let access_token = self.create_access_token(&email)?;
        let refresh_token = self.issue_refresh_token(&email).await;
        Ok(IssuedTokens {
            user: UserInfo::admin(&email),
            access_token,
            refresh_token,
        })
    }

    /// Revokes the given refresh token, and every refresh token of the user
    /// behind a valid access token. Always succeeds.
    pub async fn logout(&self, refresh_token: Option<&str>, access_token: Option<&str>) {
        let mut tokens = self.refresh_tokens.write().await;

        if let Some(token) = refresh_token {
            if let Some(data) = tokens.get_mut(&hash_refresh_token(token)) {
                data.revoked = true;
            }
        }

        if let Some(claims) = access_token.and_then(|t| self.verify(t).ok()) {
            for data in tokens.values_mut() {
                if data.email == claims.email {
                    data.revoked = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "owner@studio.test";
    const PASSWORD: &str = "correct horse battery";

    fn store() -> SessionStore {
        let admin = AdminCredentials {
            email: EMAIL.to_string(),
            password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
        };
        SessionStore::new(Some(admin), "test-secret")
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let sessions = store();
        let issued = sessions
            .login("10.0.0.1", "Owner@Studio.test", PASSWORD)
            .await
            .unwrap();
        let claims = sessions.verify(&issued.access_token).unwrap();
        assert_eq!(claims.email, EMAIL);
        assert_eq!(claims.role, ADMIN_ROLE);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_EXPIRY_MINUTES * 60);
        assert_eq!(issued.user.user_id, ADMIN_USER_ID);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unconfigured_admin() {
        let sessions = store();
        assert!(matches!(
            sessions.login("10.0.0.1", EMAIL, "nope").await,
            Err(AuthError::InvalidCredentials)
        ));

        let empty = SessionStore::new(None, "test-secret");
        assert!(matches!(
            empty.login("10.0.0.1", EMAIL, PASSWORD).await,
            Err(AuthError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_input_validation() {
        let sessions = store();
        assert!(matches!(
            sessions.login("10.0.0.1", "", PASSWORD).await,
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            sessions.login("10.0.0.1", "owner", PASSWORD).await,
            Err(AuthError::InvalidEmail)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let sessions = store();
        for _ in 0..MAX_LOGIN_ATTEMPTS {
            assert!(matches!(
                sessions.login("10.0.0.9", EMAIL, "wrong").await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            sessions.login("10.0.0.9", EMAIL, PASSWORD).await,
            Err(AuthError::RateLimited)
        ));
        assert!(sessions.login("10.0.0.10", EMAIL, PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let sessions = store();
        let issued = sessions.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();

        let rotated = sessions.refresh(&issued.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, issued.refresh_token);
        assert!(sessions.verify(&rotated.access_token).is_ok());

        assert!(matches!(
            sessions.refresh(&issued.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(matches!(
            sessions.refresh("").await,
            Err(AuthError::MissingRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_all_user_tokens() {
        let sessions = store();
        let first = sessions.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();
        let second = sessions.login("10.0.0.1", EMAIL, PASSWORD).await.unwrap();

        sessions.logout(None, Some(&second.access_token)).await;

        assert!(sessions.refresh(&first.refresh_token).await.is_err());
        assert!(sessions.refresh(&second.refresh_token).await.is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn test_expired_or_foreign_tokens_are_rejected() {
        let sessions = store();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: ADMIN_USER_ID.into(),
            email: EMAIL.into(),
            role: ADMIN_ROLE.into(),
            exp: now - 3600,
            iat: now - 7200,
        };
        let expired = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(sessions.verify(&expired), Err(AuthError::InvalidToken)));

        let other = SessionStore::new(None, "other-secret");
        let foreign = other.create_access_token(EMAIL).unwrap();
        assert!(sessions.verify(&foreign).is_err());
        assert!(sessions.verify("invalid.jwt.token").is_err());
    }
}
