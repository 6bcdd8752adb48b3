//! 资源级权限判定
//!
//! 所有判定都是纯函数：给定操作者、动作、策略以及（可选的）目标资源，
//! 返回是否允许。路由层通过 [`ensure`] 把结果转换为 401/403。

use crate::{
    error::{AppError, Result},
    models::{article::Article, comment::Comment, user::User},
};

/// 发起请求的主体
#[derive(Debug, Clone)]
pub enum Actor {
    Anonymous,
    User(User),
}

impl Actor {
    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::User(user) => Some(user),
            Actor::Anonymous => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user().map(|u| u.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::User(_))
    }

    pub fn is_staff(&self) -> bool {
        self.user().map(|u| u.is_staff).unwrap_or(false)
    }

    /// 需要登录的操作：匿名时返回 401
    pub fn require_user(&self) -> Result<&User> {
        self.user().ok_or_else(|| {
            AppError::unauthorized("Authentication credentials were not provided.")
        })
    }
}

impl From<Option<User>> for Actor {
    fn from(user: Option<User>) -> Self {
        user.map(Actor::User).unwrap_or(Actor::Anonymous)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
    Toggle,
}

impl Action {
    /// 只读动作
    pub fn is_safe(self) -> bool {
        matches!(self, Action::List | Action::Retrieve)
    }
}

/// 资源的记录归属者
pub trait Owned {
    fn owner_id(&self) -> &str;
}

impl Owned for Article {
    fn owner_id(&self) -> &str {
        &self.author_id
    }
}

impl Owned for Comment {
    fn owner_id(&self) -> &str {
        &self.user_id
    }
}

/// 各资源类型采用的权限形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// 公开读，写操作仅限 staff
    StaffWrite,
    /// 公开读，写操作限 staff 或记录归属者
    OwnerOrStaffWrite,
    /// 公开读，写操作需登录
    AuthenticatedWrite,
}

pub fn authorize(
    actor: &Actor,
    action: Action,
    policy: Policy,
    resource: Option<&dyn Owned>,
) -> bool {
    if action.is_safe() {
        return true;
    }

    let user = match actor.user() {
        Some(user) => user,
        None => return false,
    };

    match policy {
        Policy::StaffWrite => user.is_staff,
        Policy::AuthenticatedWrite => true,
        Policy::OwnerOrStaffWrite => {
            if user.is_staff {
                return true;
            }
            match resource {
                Some(resource) => resource.owner_id() == user.id,
                // 尚无目标实例（创建），只要求已登录
                None => true,
            }
        }
    }
}

/// 与 [`authorize`] 相同，拒绝时匿名返回 401，已登录返回 403
pub fn ensure(
    actor: &Actor,
    action: Action,
    policy: Policy,
    resource: Option<&dyn Owned>,
) -> Result<()> {
    if authorize(actor, action, policy, resource) {
        return Ok(());
    }

    if actor.is_authenticated() {
        Err(AppError::forbidden(
            "You do not have permission to perform this action.",
        ))
    } else {
        Err(AppError::unauthorized(
            "Authentication credentials were not provided.",
        ))
    }
}

/// 未发布文章只对 staff 可见
pub fn can_view_article(actor: &Actor, article: &Article) -> bool {
    article.is_published || actor.is_staff()
}
