use crate::{
    error::Result,
    models::{
        article::ArticleListItem,
        bookmark::{Bookmark, BookmarkWithArticle},
        like::Toggle,
        response::{PageRequest, Paginated},
    },
    services::{article::ArticleService, database::Database, permission::Actor},
};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BookmarkService {
    db: Database,
    articles: ArticleService,
}

impl BookmarkService {
    pub fn new(db: Database, articles: ArticleService) -> Self {
        Self { db, articles }
    }

    /// 与点赞相同的开关语义
    pub async fn toggle(&self, article_id: &str, user_id: &str) -> Result<Toggle> {
        debug!("Toggling bookmark on {} for {}", article_id, user_id);

        if self.db.delete_bookmark(article_id, user_id).await? {
            return Ok(Toggle::Removed);
        }

        match self.db.insert_bookmark(&Bookmark::new(article_id, user_id)).await {
            Ok(()) => Ok(Toggle::Added),
            Err(e) if e.is_unique_violation() => {
                warn!("Concurrent bookmark on {} by {}, removing", article_id, user_id);
                self.db.delete_bookmark(article_id, user_id).await?;
                Ok(Toggle::Removed)
            }
            Err(e) => Err(e),
        }
    }

    /// 当前用户的收藏，新的在前
    pub async fn list_bookmarks(
        &self,
        actor: &Actor,
        user_id: &str,
        page: PageRequest,
    ) -> Result<Paginated<BookmarkWithArticle>> {
        // 非 staff 看不到已撤回为草稿的文章
        let (bookmarks, total) = self
            .db
            .list_bookmarks(user_id, !actor.is_staff(), page.offset(), page.limit())
            .await?;

        let ids: Vec<String> = bookmarks.iter().map(|b| b.article_id.clone()).collect();
        let articles = self.db.get_articles(&ids).await?;
        let mut items: HashMap<String, ArticleListItem> = self
            .articles
            .to_list_items(actor, articles)
            .await?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let results = bookmarks
            .into_iter()
            .filter_map(|bookmark| {
                let article = items.remove(&bookmark.article_id)?;
                Some(BookmarkWithArticle {
                    id: bookmark.id,
                    article,
                    created_at: bookmark.created_at,
                })
            })
            .collect();

        Ok(Paginated::new(results, total, page))
    }
}
