//! Shared request parsing and response shaping.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::catalog::Dataset;
use crate::query::{QueryError, SearchRequest, EXPORT_ROW_CAP};

use super::super::AppState;

/// Raw query-string pairs, in request order.
pub type QueryPairs = Vec<(String, String)>;

/// `{ "data": [...], "total": n }` for drill-down lists.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        let total = data.len();
        Self { data, total }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn search_request(pairs: &QueryPairs) -> SearchRequest {
    SearchRequest::from_query_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// An unknown identifier is an ordinary answer: 200 with `{error}`.
pub fn not_found(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Store failures become a 500 carrying the message.
pub fn query_failed(e: QueryError) -> Response {
    tracing::error!(error = %e, "query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

/// Serialize `result` as JSON or report the failure.
pub fn json_or_error<T: Serialize>(result: Result<T, QueryError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => query_failed(e),
    }
}

/// Detail rows, or the dataset's not-found message when there are none.
pub fn detail_response<T: Serialize>(result: Result<Vec<T>, QueryError>, missing: &str) -> Response {
    match result {
        Ok(data) if data.is_empty() => not_found(missing),
        Ok(data) => Json(DetailResponse { data }).into_response(),
        Err(e) => query_failed(e),
    }
}

/// Stream the filtered rows of `dataset` as a CSV attachment.
pub async fn csv_export(state: &AppState, dataset: Dataset, pairs: &QueryPairs, filename: &str) -> Response {
    let request = search_request(pairs);
    let predicates = request.predicates(dataset);
    match state.engine.export(dataset, &predicates, EXPORT_ROW_CAP).await {
        Ok(stream) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename={}", filename),
                ),
            ],
            Body::from_stream(stream),
        )
            .into_response(),
        Err(e) => query_failed(e),
    }
}
