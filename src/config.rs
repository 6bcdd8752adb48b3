use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_format: String,

    // Database configuration
    pub database_url: String,
    pub database_namespace: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,

    // Authentication configuration
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,

    // Listing settings
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub trending_window_days: i64,
    pub highlight_limit: usize,

    // CORS configuration
    pub cors_allowed_origins: String,
}

const DEV_JWT_SECRET: &str = "dev-only-insecure-jwt-secret";

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3000,
            environment: "development".to_string(),
            log_level: "blog_platform=debug,tower_http=debug".to_string(),
            log_format: "pretty".to_string(),
            database_url: "memory".to_string(),
            database_namespace: "blog".to_string(),
            database_name: "blog".to_string(),
            database_username: "root".to_string(),
            database_password: "root".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_ttl_minutes: 60,
            refresh_token_ttl_days: 7,
            default_page_size: 10,
            max_page_size: 100,
            trending_window_days: 7,
            highlight_limit: 10,
            cors_allowed_origins: "http://localhost:3001".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == "production" => {
                anyhow::bail!("JWT_SECRET must be set in production")
            }
            _ => DEV_JWT_SECRET.to_string(),
        };

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment,
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "blog_platform=debug,tower_http=debug".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),

            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory".to_string()),
            database_namespace: env::var("DATABASE_NAMESPACE")
                .unwrap_or_else(|_| "blog".to_string()),
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "blog".to_string()),
            database_username: env::var("DATABASE_USERNAME")
                .unwrap_or_else(|_| "root".to_string()),
            database_password: env::var("DATABASE_PASSWORD")
                .unwrap_or_else(|_| "root".to_string()),

            jwt_secret,
            access_token_ttl_minutes: env::var("ACCESS_TOKEN_TTL_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            refresh_token_ttl_days: env::var("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()?,

            default_page_size: env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            max_page_size: env::var("MAX_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            trending_window_days: env::var("TRENDING_WINDOW_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()?,
            highlight_limit: env::var("HIGHLIGHT_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        matches!(self.database_url.as_str(), "memory" | "mem://")
    }
}
