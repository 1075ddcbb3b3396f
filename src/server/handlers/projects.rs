//! Project (CUP) endpoints.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use crate::catalog::Dataset;

use super::super::AppState;
use super::helpers::{csv_export, detail_response, json_or_error, search_request, ListResponse, QueryPairs};

pub async fn search_projects(State(state): State<AppState>, Query(pairs): Query<QueryPairs>) -> Response {
    let request = search_request(&pairs);
    json_or_error(state.engine.search_page(Dataset::Projects, &request).await)
}

pub async fn project_detail(State(state): State<AppState>, Path(cup): Path<String>) -> Response {
    detail_response(
        state.engine.detail(Dataset::Projects, &cup).await,
        "Progetto non trovato",
    )
}

/// Procurements attached to a project.
pub async fn project_procurements(State(state): State<AppState>, Path(cup): Path<String>) -> Response {
    json_or_error(
        state
            .engine
            .procurements_for_project(&cup)
            .await
            .map(ListResponse::from),
    )
}

pub async fn project_filter_options(State(state): State<AppState>) -> Response {
    json_or_error(state.engine.filter_options(Dataset::Projects).await)
}

pub async fn project_aggregation(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    let predicates = search_request(&pairs).predicates(Dataset::Projects);
    json_or_error(
        state
            .engine
            .aggregate(Dataset::Projects, &field, &predicates)
            .await,
    )
}

pub async fn export_projects(State(state): State<AppState>, Query(pairs): Query<QueryPairs>) -> Response {
    csv_export(&state, Dataset::Projects, &pairs, "opencup_export.csv").await
}
