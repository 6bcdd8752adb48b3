use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    error::{AppError, FieldErrors, Result},
    models::{
        response::{PageRequest, Paginated},
        user::*,
    },
    services::{
        auth::{hash_password, verify_password, PasswordHasher},
        database::{constraint, Database},
    },
    utils::validation::{password_policy_violations, validate_username},
};

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const EMAIL_TAKEN: &str = "A user with that email already exists.";

#[derive(Clone)]
pub struct UserService {
    db: Database,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(db: Database, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { db, hasher }
    }

    /// 注册新用户，所有字段错误一次性返回
    pub async fn register(&self, request: RegisterRequest) -> Result<User> {
        debug!("Registering user {}", request.username);

        let mut errors = match request.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        if let Err(msg) = validate_username(&request.username) {
            errors.add("username", "invalid", msg);
        }
        if request.password != request.password_confirm {
            errors.add("password", "mismatch", "Password fields didn't match.");
        }
        for violation in
            password_policy_violations(&request.password, &request.username, &request.email)
        {
            errors.add("password", "weak", violation);
        }
        if self.db.find_user_by_username(&request.username).await?.is_some() {
            errors.add("username", "unique", USERNAME_TAKEN);
        }
        if self.db.find_user_by_email(&request.email).await?.is_some() {
            errors.add("email", "unique", EMAIL_TAKEN);
        }
        errors.into_result()?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: request.username,
            email: request.email,
            password_hash: hash_password(&self.hasher, &request.password).await?,
            first_name: request.first_name,
            last_name: request.last_name,
            is_staff: false,
            is_active: true,
            date_joined: Utc::now(),
        };

        // 并发注册时由唯一约束兜底
        self.db.insert_user(&user).await.map_err(unique_to_field)?;
        self.ensure_profile(&user).await?;

        info!("User registered: {} ({})", user.username, user.id);
        Ok(user)
    }

    /// 返回用户资料，不存在时创建
    pub async fn ensure_profile(&self, user: &User) -> Result<Profile> {
        if let Some(profile) = self.db.get_profile(&user.id).await? {
            return Ok(profile);
        }

        let profile = Profile::empty_for(&user.id);
        match self.db.insert_profile(&profile).await {
            Ok(()) => Ok(profile),
            Err(e) if e.is_unique_violation() => self
                .db
                .get_profile(&user.id)
                .await?
                .ok_or_else(|| AppError::internal("Profile vanished after conflict")),
            Err(e) => Err(e),
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<User> {
        self.db
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    pub async fn user_detail(&self, user: &User) -> Result<UserResponse> {
        let profile = self.ensure_profile(user).await?;
        let articles_count = self.db.count_articles_by_author(&user.id).await?;
        let comments_count = self.db.count_comments_by_user(&user.id).await?;

        Ok(UserResponse {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_staff: user.is_staff,
            date_joined: user.date_joined,
            profile: profile.into(),
            articles_count,
            comments_count,
        })
    }

    pub async fn list_users(
        &self,
        query: &UserListQuery,
        page: PageRequest,
    ) -> Result<Paginated<UserResponse>> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let (users, total) = self
            .db
            .list_users(search, page.offset(), page.limit())
            .await?;

        let mut results = Vec::with_capacity(users.len());
        for user in &users {
            results.push(self.user_detail(user).await?);
        }
        Ok(Paginated::new(results, total, page))
    }

    /// 合并更新用户字段与资料字段
    pub async fn update_profile(
        &self,
        user: &User,
        request: UpdateProfileRequest,
    ) -> Result<UserResponse> {
        request.validate()?;

        if let Some(email) = &request.email {
            if *email != user.email && self.db.find_user_by_email(email).await?.is_some() {
                return Err(AppError::field("email", "unique", EMAIL_TAKEN));
            }
        }
        let changes = UserChanges {
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            ..Default::default()
        };
        let updated = self
            .db
            .update_user_fields(&user.id, &changes)
            .await
            .map_err(unique_to_field)?
            .ok_or_else(|| AppError::not_found("User"))?;

        let mut profile = self.ensure_profile(&updated).await?;
        if let Some(bio) = request.bio {
            profile.bio = bio;
        }
        if let Some(website) = request.website {
            profile.website = website;
        }
        if let Some(location) = request.location {
            profile.location = location;
        }
        if let Some(birth_date) = request.birth_date {
            profile.birth_date = birth_date;
        }
        profile.updated_at = Utc::now();
        self.db.update_profile(&profile).await?;

        info!("Profile updated for user {}", updated.id);
        self.user_detail(&updated).await
    }

    pub async fn change_password(&self, user: &User, request: ChangePasswordRequest) -> Result<()> {
        let mut errors = FieldErrors::new();

        if !verify_password(&self.hasher, &request.old_password, &user.password_hash).await? {
            errors.add("old_password", "incorrect", "Old password is incorrect");
        }
        if request.new_password != request.new_password_confirm {
            errors.add("new_password", "mismatch", "Password fields didn't match.");
        }
        for violation in password_policy_violations(&request.new_password, &user.username, &user.email)
        {
            errors.add("new_password", "weak", violation);
        }
        errors.into_result()?;

        let changes = UserChanges {
            password_hash: Some(hash_password(&self.hasher, &request.new_password).await?),
            ..Default::default()
        };
        self.db
            .update_user_fields(&user.id, &changes)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        info!("Password changed for user {}", user.id);
        Ok(())
    }

    pub async fn delete_account(&self, user: &User) -> Result<()> {
        if !self.db.delete_user(&user.id).await? {
            return Err(AppError::not_found("User"));
        }
        info!("User {} deleted with all owned content", user.id);
        Ok(())
    }

    /// 设置或撤销 staff 标记
    pub async fn set_staff(&self, username: &str, is_staff: bool) -> Result<User> {
        let found = self
            .db
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        let changes = UserChanges {
            is_staff: Some(is_staff),
            ..Default::default()
        };
        let user = self
            .db
            .update_user_fields(&found.id, &changes)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        info!("User {} staff flag set to {}", user.username, is_staff);
        Ok(user)
    }

    /// 批量构造作者摘要，缺失的用户被跳过
    pub async fn author_summaries(&self, ids: &[String]) -> Result<HashMap<String, AuthorSummary>> {
        let mut authors = HashMap::new();
        for id in ids {
            if authors.contains_key(id) {
                continue;
            }
            match self.db.get_user(id).await? {
                Some(user) => {
                    let profile = self.db.get_profile(id).await?;
                    authors.insert(id.clone(), AuthorSummary::new(&user, profile.as_ref()));
                }
                None => warn!("Author {} referenced but missing", id),
            }
        }
        Ok(authors)
    }
}

/// 注册竞争时的唯一约束冲突转为字段错误
fn unique_to_field(err: AppError) -> AppError {
    match err {
        AppError::UniqueViolation(name) if name == constraint::USERNAME => {
            AppError::field("username", "unique", USERNAME_TAKEN)
        }
        AppError::UniqueViolation(name) if name == constraint::EMAIL => {
            AppError::field("email", "unique", EMAIL_TAKEN)
        }
        other => other,
    }
}
