//! In-memory article repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::application::articles::{
    ArticleChanges, ArticleFilter, ArticlesRepo, NewArticle, RepoError,
};
use crate::application::pagination::PageRequest;
use crate::domain::articles::{ArticleId, ArticleRecord};

#[derive(Default)]
struct Table {
    rows: BTreeMap<ArticleId, ArticleRecord>,
    last_id: ArticleId,
}

/// Articles kept in process memory, ordered by id.
#[derive(Default)]
pub struct InMemoryArticlesRepo {
    table: RwLock<Table>,
}

impl InMemoryArticlesRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticlesRepo for InMemoryArticlesRepo {
    async fn list(
        &self,
        filter: &ArticleFilter,
        page: PageRequest,
    ) -> Result<(Vec<ArticleRecord>, u64), RepoError> {
        let table = self.table.read().await;
        let matching: Vec<&ArticleRecord> = table
            .rows
            .values()
            .filter(|record| {
                filter
                    .search
                    .as_deref()
                    .is_none_or(|needle| record.matches(needle))
            })
            .collect();

        let count = matching.len() as u64;
        let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let take = usize::try_from(page.limit).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(skip)
            .take(take)
            .cloned()
            .collect();
        Ok((items, count))
    }

    async fn find(&self, id: ArticleId) -> Result<Option<ArticleRecord>, RepoError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn insert(&self, article: NewArticle) -> Result<ArticleRecord, RepoError> {
        let mut table = self.table.write().await;
        let id = table
            .last_id
            .checked_add(1)
            .ok_or_else(|| RepoError::from_persistence("article id space exhausted"))?;

        let record = ArticleRecord {
            id,
            title: article.title,
            description: article.description,
            created_at: OffsetDateTime::now_utc(),
        };
        table.last_id = id;
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: ArticleId,
        changes: ArticleChanges,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let mut table = self.table.write().await;
        let Some(record) = table.rows.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            record.title = title;
        }
        if let Some(description) = changes.description {
            record.description = description;
        }
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: ArticleId) -> Result<Option<ArticleRecord>, RepoError> {
        Ok(self.table.write().await.rows.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_article(title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            description: "description".to_string(),
        }
    }

    #[tokio::test]
    async fn ids_are_never_reused() {
        let repo = InMemoryArticlesRepo::new();
        let first = repo.insert(new_article("first")).await.expect("insert");
        repo.delete(first.id).await.expect("delete");
        let second = repo.insert(new_article("second")).await.expect("insert");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn list_past_the_end_is_empty_but_counted() {
        let repo = InMemoryArticlesRepo::new();
        for title in ["a", "b", "c"] {
            repo.insert(new_article(title)).await.expect("insert");
        }

        let (items, count) = repo
            .list(&ArticleFilter::default(), PageRequest::new(Some(5), Some(10)))
            .await
            .expect("list");
        assert!(items.is_empty());
        assert_eq!(count, 3);

        let (items, _) = repo
            .list(&ArticleFilter::default(), PageRequest::new(Some(0), Some(0)))
            .await
            .expect("list");
        assert!(items.is_empty());
    }
}
