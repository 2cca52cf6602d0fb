use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    application::{
        articles::{
            CreateArticleCommand, ListArticlesQuery, PatchArticleCommand, ReplaceArticleCommand,
        },
        error::{HttpError, codes},
    },
    domain::articles::ArticleId,
};

use super::HttpState;

const SOURCE: &str = "infra::http::articles";

/// Raw list query; empty values count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ListQuery {
    page: Option<String>,
    limit: Option<String>,
    search: Option<String>,
}

impl ListQuery {
    fn into_query(self) -> Result<ListArticlesQuery, HttpError> {
        Ok(ListArticlesQuery {
            page: parse_number("page", self.page)?,
            limit: parse_number("limit", self.limit)?,
            search: self.search.filter(|value| !value.is_empty()),
        })
    }
}

pub(super) async fn list(
    State(state): State<HttpState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, HttpError> {
    let page = state.articles.list(query.into_query()?).await?;
    Ok(Json(page).into_response())
}

pub(super) async fn create(
    State(state): State<HttpState>,
    body: Result<Json<CreateArticleCommand>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(command) = body.map_err(bad_body)?;
    let record = state.articles.create(command).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub(super) async fn show(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let record = state.articles.get(parse_id(&id)?).await?;
    Ok(Json(record).into_response())
}

pub(super) async fn replace(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    body: Result<Json<ReplaceArticleCommand>, JsonRejection>,
) -> Result<Response, HttpError> {
    let id = parse_id(&id)?;
    let Json(command) = body.map_err(bad_body)?;
    let record = state.articles.replace(id, command).await?;
    Ok(Json(record).into_response())
}

pub(super) async fn patch(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    body: Result<Json<PatchArticleCommand>, JsonRejection>,
) -> Result<Response, HttpError> {
    let id = parse_id(&id)?;
    let Json(command) = body.map_err(bad_body)?;
    let record = state.articles.patch(id, command).await?;
    Ok(Json(record).into_response())
}

pub(super) async fn delete(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    let record = state.articles.delete(parse_id(&id)?).await?;
    Ok(Json(record).into_response())
}

fn parse_id(raw: &str) -> Result<ArticleId, HttpError> {
    raw.parse().map_err(|_| {
        HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            codes::BAD_REQUEST,
            "Article id must be a non-negative integer",
            format!("unparsable article id `{raw}`"),
        )
    })
}

fn parse_number(name: &'static str, raw: Option<String>) -> Result<Option<u64>, HttpError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                format!("`{name}` must be a non-negative integer"),
                format!("unparsable {name} `{value}`"),
            )
        }),
    }
}

fn bad_body(rejection: JsonRejection) -> HttpError {
    HttpError::from_error(
        SOURCE,
        rejection.status(),
        codes::BAD_REQUEST,
        rejection.body_text(),
        &rejection,
    )
}
