//! Search and suggestion endpoints.
//!
//! Query parameters map onto the structured search query: list fields are
//! comma-separated, dates are RFC 3339, the cursor is the opaque string
//! from the previous page.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::search::{SearchQuery, SearchResponse, SortBy};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub sports: Option<String>,
    pub sources: Option<String>,
    pub content_types: Option<String>,
    pub quality_threshold: Option<f64>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|list| {
            list.split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl From<SearchParams> for SearchQuery {
    fn from(params: SearchParams) -> Self {
        SearchQuery {
            query: params.q,
            sports: split_list(params.sports),
            sources: split_list(params.sources),
            content_types: split_list(params.content_types),
            quality_threshold: params.quality_threshold,
            date_start: params.date_start,
            date_end: params.date_end,
            sort_by: params
                .sort_by
                .as_deref()
                .map(SortBy::parse)
                .unwrap_or_default(),
            limit: params.limit.unwrap_or(20),
            cursor: params.cursor,
        }
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<Value>)> {
    let query: SearchQuery = params.into();

    match state.search.search(query).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!(error = %e, "Search failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "search failed"})),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub prefix: String,
    pub limit: Option<i64>,
}

pub async fn suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state
        .search
        .suggest(&params.prefix, params.limit.unwrap_or(5))
        .await
    {
        Ok(suggestions) => Ok(Json(json!({ "suggestions": suggestions }))),
        Err(e) => {
            error!(error = %e, "Suggestion lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "suggest failed"})),
            ))
        }
    }
}
