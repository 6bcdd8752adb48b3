use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::user::{LoginRequest, RefreshRequest, TokenPair, User},
    services::database::Database,
};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";
/// 未知用户登录时用于比对的占位口令
const DUMMY_PASSWORD: &str = "unused-placeholder-password";

/// 口令哈希的抽象，便于替换算法
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// 默认参数的 Argon2id
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        use argon2::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("Stored password hash is malformed: {}", e);
                false
            }
        }
    }
}

/// 在阻塞线程池上计算哈希
pub async fn hash_password(hasher: &Arc<dyn PasswordHasher>, password: &str) -> Result<String> {
    let hasher = Arc::clone(hasher);
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// 在阻塞线程池上校验口令
pub async fn verify_password(
    hasher: &Arc<dyn PasswordHasher>,
    password: &str,
    hash: &str,
) -> Result<bool> {
    let hasher = Arc::clone(hasher);
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // 用户ID
    pub token_type: TokenType,
    pub iat: i64,           // 签发时间
    pub exp: i64,           // 过期时间
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    hasher: Arc<dyn PasswordHasher>,
    dummy_hash: Arc<OnceCell<String>>,
    jwt_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Database, hasher: Arc<dyn PasswordHasher>, config: &Config) -> Self {
        Self {
            db,
            hasher,
            dummy_hash: Arc::new(OnceCell::new()),
            jwt_secret: config.jwt_secret.clone(),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    fn sign(&self, user_id: &str, token_type: TokenType, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?)
    }

    pub fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.sign(&user.id, TokenType::Access, self.access_ttl)?,
            refresh: self.sign(&user.id, TokenType::Refresh, self.refresh_ttl)?,
        })
    }

    pub fn verify_jwt(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| {
                debug!("JWT verification failed: {}", e);
                AppError::unauthorized("Token is invalid or expired")
            })?
            .claims;

        if claims.token_type != expected {
            return Err(AppError::unauthorized("Token has wrong type"));
        }
        Ok(claims)
    }

    /// 用户名密码换取令牌对
    pub async fn login(&self, request: LoginRequest) -> Result<TokenPair> {
        debug!("Login attempt for {}", request.username);

        let user = match self.db.find_user_by_username(&request.username).await? {
            Some(user) if user.is_active => user,
            _ => {
                // 未知或停用的账号同样执行一次完整校验
                let dummy = self.dummy_hash().await?;
                verify_password(&self.hasher, &request.password, &dummy).await?;
                return Err(AppError::unauthorized(INVALID_CREDENTIALS));
            }
        };

        if !verify_password(&self.hasher, &request.password, &user.password_hash).await? {
            warn!("Failed login for {}", request.username);
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        info!("User {} logged in", user.id);
        self.issue_tokens(&user)
    }

    /// 刷新令牌换取新的访问令牌
    pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair> {
        let claims = self.verify_jwt(&request.refresh, TokenType::Refresh)?;
        let user = self.active_user(&claims.sub).await?;

        Ok(TokenPair {
            access: self.sign(&user.id, TokenType::Access, self.access_ttl)?,
            refresh: request.refresh,
        })
    }

    /// 解析 Bearer 访问令牌对应的用户
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let claims = self.verify_jwt(token, TokenType::Access)?;
        self.active_user(&claims.sub).await
    }

    async fn dummy_hash(&self) -> Result<String> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = hash_password(&self.hasher, DUMMY_PASSWORD).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }

    async fn active_user(&self, id: &str) -> Result<User> {
        match self.db.get_user(id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AppError::unauthorized("User not found or inactive")),
        }
    }
}
