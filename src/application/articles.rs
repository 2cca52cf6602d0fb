//! Article use cases over a repository.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{Page, PageRequest};
use crate::domain::articles::{ArticleId, ArticleRecord, validate_description, validate_title};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Article persistence.
#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    /// Matching articles of one page, plus the total number of matches.
    async fn list(
        &self,
        filter: &ArticleFilter,
        page: PageRequest,
    ) -> Result<(Vec<ArticleRecord>, u64), RepoError>;

    async fn find(&self, id: ArticleId) -> Result<Option<ArticleRecord>, RepoError>;

    async fn insert(&self, article: NewArticle) -> Result<ArticleRecord, RepoError>;

    async fn update(
        &self,
        id: ArticleId,
        changes: ArticleChanges,
    ) -> Result<Option<ArticleRecord>, RepoError>;

    async fn delete(&self, id: ArticleId) -> Result<Option<ArticleRecord>, RepoError>;
}

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("article `{id}` not found")]
    NotFound { id: ArticleId },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListArticlesQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateArticleCommand {
    pub title: String,
    pub description: String,
}

/// Full replacement; both fields are required.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceArticleCommand {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatchArticleCommand {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct ArticleService {
    repo: Arc<dyn ArticlesRepo>,
}

impl ArticleService {
    pub fn new(repo: Arc<dyn ArticlesRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, query: ListArticlesQuery) -> Result<Page<ArticleRecord>, ArticleError> {
        let request = PageRequest::new(query.page, query.limit);
        let filter = ArticleFilter {
            search: query
                .search
                .map(|search| search.trim().to_string())
                .filter(|search| !search.is_empty()),
        };

        let (items, count) = self.repo.list(&filter, request).await?;
        debug!(count, page = request.page, limit = request.limit, "listed articles");
        Ok(Page::new(items, count, request))
    }

    pub async fn get(&self, id: ArticleId) -> Result<ArticleRecord, ArticleError> {
        self.repo
            .find(id)
            .await?
            .ok_or(ArticleError::NotFound { id })
    }

    pub async fn create(
        &self,
        command: CreateArticleCommand,
    ) -> Result<ArticleRecord, ArticleError> {
        validate_title(&command.title)?;
        validate_description(&command.description)?;

        let record = self
            .repo
            .insert(NewArticle {
                title: command.title,
                description: command.description,
            })
            .await?;
        debug!(id = record.id, "created article");
        Ok(record)
    }

    pub async fn replace(
        &self,
        id: ArticleId,
        command: ReplaceArticleCommand,
    ) -> Result<ArticleRecord, ArticleError> {
        validate_title(&command.title)?;
        validate_description(&command.description)?;

        self.apply(
            id,
            ArticleChanges {
                title: Some(command.title),
                description: Some(command.description),
            },
        )
        .await
    }

    pub async fn patch(
        &self,
        id: ArticleId,
        command: PatchArticleCommand,
    ) -> Result<ArticleRecord, ArticleError> {
        if let Some(title) = command.title.as_deref() {
            validate_title(title)?;
        }
        if let Some(description) = command.description.as_deref() {
            validate_description(description)?;
        }

        self.apply(
            id,
            ArticleChanges {
                title: command.title,
                description: command.description,
            },
        )
        .await
    }

    pub async fn delete(&self, id: ArticleId) -> Result<ArticleRecord, ArticleError> {
        let record = self
            .repo
            .delete(id)
            .await?
            .ok_or(ArticleError::NotFound { id })?;
        debug!(id, "deleted article");
        Ok(record)
    }

    async fn apply(
        &self,
        id: ArticleId,
        changes: ArticleChanges,
    ) -> Result<ArticleRecord, ArticleError> {
        self.repo
            .update(id, changes)
            .await?
            .ok_or(ArticleError::NotFound { id })
    }
}
