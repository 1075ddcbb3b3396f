//! Procurement (CIG) endpoints.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use crate::catalog::Dataset;

use super::super::AppState;
use super::helpers::{csv_export, detail_response, json_or_error, search_request, ListResponse, QueryPairs};

pub async fn search_procurements(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    let request = search_request(&pairs);
    json_or_error(state.engine.search_page(Dataset::Procurements, &request).await)
}

pub async fn procurement_detail(State(state): State<AppState>, Path(cig): Path<String>) -> Response {
    detail_response(
        state.engine.detail(Dataset::Procurements, &cig).await,
        "CIG non trovato",
    )
}

/// Project codes a procurement points to.
pub async fn procurement_projects(State(state): State<AppState>, Path(cig): Path<String>) -> Response {
    json_or_error(
        state
            .engine
            .projects_for_procurement(&cig)
            .await
            .map(ListResponse::from),
    )
}

pub async fn procurement_awardees(State(state): State<AppState>, Path(cig): Path<String>) -> Response {
    json_or_error(
        state
            .engine
            .awardees_for_procurement(&cig)
            .await
            .map(ListResponse::from),
    )
}

pub async fn procurement_filter_options(State(state): State<AppState>) -> Response {
    json_or_error(state.engine.filter_options(Dataset::Procurements).await)
}

pub async fn procurement_aggregation(
    State(state): State<AppState>,
    Path(field): Path<String>,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    let predicates = search_request(&pairs).predicates(Dataset::Procurements);
    json_or_error(
        state
            .engine
            .aggregate(Dataset::Procurements, &field, &predicates)
            .await,
    )
}

pub async fn export_procurements(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Response {
    csv_export(&state, Dataset::Procurements, &pairs, "cig_export.csv").await
}
