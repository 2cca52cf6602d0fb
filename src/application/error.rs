use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    application::articles::{ArticleError, RepoError},
    domain::error::DomainError,
    infra::error::InfraError,
};

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION: &str = "validation_error";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub code: &'static str,
    pub message: String,
}

/// Client-facing error: a JSON body plus an attached [`ErrorReport`].
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    code: &'static str,
    public_message: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        public_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            code,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        code: &'static str,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            code,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorMessage {
                code: self.code,
                message: self.public_message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ArticleError> for HttpError {
    fn from(error: ArticleError) -> Self {
        const SOURCE: &str = "application::error::article_error_to_http_error";
        match &error {
            ArticleError::NotFound { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::NOT_FOUND,
                codes::NOT_FOUND,
                "Article not found",
                &error,
            ),
            ArticleError::Domain(DomainError::Validation { message }) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                codes::VALIDATION,
                message.clone(),
                &error,
            ),
            ArticleError::Repo(RepoError::Persistence(_)) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::REPO,
                "Persistence error",
                &error,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Article(#[from] ArticleError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Article(error) => HttpError::from(error).into_response(),
            other => HttpError::from_error(
                "application::error::AppError",
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "Unexpected error occurred",
                &other,
            )
            .into_response(),
        }
    }
}
