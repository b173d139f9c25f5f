//! Environment configuration.
//!
//! Everything is read through a lookup function so tests can feed a map
//! instead of mutating the process environment. Missing optional values
//! produce warnings; only an unusable backend or an insecure production
//! secret is fatal.

use std::collections::HashMap;

use thiserror::Error;

use crate::db::DbConfig;

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no persistence backend configured: set STUDIO_BACKEND_URL and STUDIO_BACKEND_KEY, or DATABASE_URL")]
    MissingBackend,

    #[error("STUDIO_BACKEND_URL is set but STUDIO_BACKEND_KEY is missing")]
    MissingBackendKey,

    #[error("JWT_SECRET must be set to a unique value in production")]
    InsecureJwtSecret,

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to hash ADMIN_PASSWORD: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    Rest {
        url: String,
        api_key: String,
        token: Option<String>,
    },
    Postgres(DbConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub planner: bool,
    pub gated_gallery: bool,
    pub image_optimization: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            planner: true,
            gated_gallery: true,
            image_optimization: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub url: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub backend: BackendConfig,
    pub admin: Option<AdminCredentials>,
    pub jwt_secret: String,
    pub features: FeatureFlags,
    pub site: SiteConfig,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<(Self, Vec<String>), ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_map(vars: &HashMap<&str, &str>) -> Result<(Self, Vec<String>), ConfigError> {
        Self::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<(Self, Vec<String>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut warnings = Vec::new();

        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let is_production = environment == "production";

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match var("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => 3001,
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .or_else(|| var("FRONTEND_ORIGIN").map(|o| vec![o]))
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let backend = match (var("STUDIO_BACKEND_URL"), var("STUDIO_BACKEND_KEY")) {
            (Some(url), Some(api_key)) => BackendConfig::Rest {
                url,
                api_key,
                token: var("STUDIO_BACKEND_TOKEN"),
            },
            (Some(_), None) => return Err(ConfigError::MissingBackendKey),
            (None, _) => match var("DATABASE_URL") {
                Some(url) => BackendConfig::Postgres(DbConfig::from_lookup(url, &var)),
                None if is_production => return Err(ConfigError::MissingBackend),
                None => {
                    warnings.push(
                        "No backend configured (STUDIO_BACKEND_URL/STUDIO_BACKEND_KEY or DATABASE_URL); \
                         using the in-memory store"
                            .to_string(),
                    );
                    BackendConfig::Memory
                }
            },
        };

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) if secret != DEFAULT_JWT_SECRET => secret,
            _ if is_production => return Err(ConfigError::InsecureJwtSecret),
            _ => {
                warnings.push("JWT_SECRET not set; using the development default".to_string());
                DEFAULT_JWT_SECRET.to_string()
            }
        };

        let admin = match var("ADMIN_EMAIL") {
            None => {
                warnings.push("ADMIN_EMAIL not set; admin login is disabled".to_string());
                None
            }
            Some(email) => match (var("ADMIN_HASH_PASSWORD"), var("ADMIN_PASSWORD")) {
                (Some(password_hash), _) => Some(AdminCredentials {
                    email,
                    password_hash,
                }),
                (None, Some(plain)) => {
                    warnings.push(
                        "ADMIN_PASSWORD is a plaintext secret; prefer ADMIN_HASH_PASSWORD \
                         (see the hash-password binary)"
                            .to_string(),
                    );
                    Some(AdminCredentials {
                        email,
                        password_hash: bcrypt::hash(plain, bcrypt::DEFAULT_COST)?,
                    })
                }
                (None, None) => {
                    warnings.push(
                        "Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set; admin login is disabled"
                            .to_string(),
                    );
                    None
                }
            },
        };

        let flag = |name: &'static str, warnings: &mut Vec<String>| match var(name) {
            None => true,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    warnings.push(format!("{name}={value} is not a boolean; keeping it enabled"));
                    true
                }
            },
        };
        let features = FeatureFlags {
            planner: flag("FEATURE_PLANNER", &mut warnings),
            gated_gallery: flag("FEATURE_GATED_GALLERY", &mut warnings),
            image_optimization: flag("FEATURE_IMAGE_OPTIMIZATION", &mut warnings),
        };

        let site = SiteConfig {
            url: var("SITE_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            title: var("SITE_TITLE").unwrap_or_else(|| "Studio Journal".to_string()),
            description: var("SITE_DESCRIPTION")
                .unwrap_or_else(|| "Stories and sessions from the studio".to_string()),
        };

        Ok((
            Self {
                environment,
                host,
                port,
                allowed_origins,
                backend,
                admin,
                jwt_secret,
                features,
                site,
            },
            warnings,
        ))
    }
}
