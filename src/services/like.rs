use crate::{
    error::Result,
    models::like::{ArticleLike, LikeResponse, Toggle},
    services::{database::Database, user::UserService},
};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct LikeService {
    db: Database,
    users: UserService,
}

impl LikeService {
    pub fn new(db: Database, users: UserService) -> Self {
        Self { db, users }
    }

    /// 行存在则删除，否则创建；插入撞上唯一约束说明并发请求已创建，转为删除
    pub async fn toggle(&self, article_id: &str, user_id: &str) -> Result<Toggle> {
        debug!("Toggling like on {} for {}", article_id, user_id);

        if self.db.delete_like(article_id, user_id).await? {
            return Ok(Toggle::Removed);
        }

        match self.db.insert_like(&ArticleLike::new(article_id, user_id)).await {
            Ok(()) => Ok(Toggle::Added),
            Err(e) if e.is_unique_violation() => {
                warn!("Concurrent like on {} by {}, removing", article_id, user_id);
                self.db.delete_like(article_id, user_id).await?;
                Ok(Toggle::Removed)
            }
            Err(e) => Err(e),
        }
    }

    /// 点赞用户列表，新的在前
    pub async fn likes(&self, article_id: &str) -> Result<Vec<LikeResponse>> {
        let likes = self.db.list_likes(article_id).await?;
        let user_ids: Vec<String> = likes.iter().map(|l| l.user_id.clone()).collect();
        let users = self.users.author_summaries(&user_ids).await?;

        Ok(likes
            .into_iter()
            .filter_map(|like| {
                Some(LikeResponse {
                    user: users.get(&like.user_id)?.clone(),
                    id: like.id,
                    created_at: like.created_at,
                })
            })
            .collect())
    }
}
