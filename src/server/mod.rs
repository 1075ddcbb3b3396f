//! JSON API over the query engine.
//!
//! Every handler is a thin adapter: parse the query string leniently, call
//! one [`QueryEngine`] operation, serialize the result.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::query::QueryEngine;
use crate::store::Store;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

impl AppState {
    /// Open the store under `settings`; a missing mandatory table is fatal.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let store = Store::open(settings.store_paths(), &settings.engine_options()).await?;
        Ok(Self::from_engine(QueryEngine::new(Arc::new(store))))
    }

    pub fn from_engine(engine: QueryEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings).await?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use arrow::array::{ArrayRef, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use crate::catalog::{PROCUREMENTS, PROJECTS};
    use crate::ingest::write_batch;
    use crate::store::{EngineOptions, StorePaths};

    /// All-text batch over `columns`; fields a row omits are null.
    fn table(columns: &[&str], rows: &[&[(&str, &str)]]) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(*c, DataType::Utf8, true))
            .collect();
        let arrays: Vec<ArrayRef> = columns
            .iter()
            .map(|c| {
                let values: StringArray = rows
                    .iter()
                    .map(|row| row.iter().find(|(k, _)| k == c).map(|(_, v)| *v))
                    .collect();
                Arc::new(values) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());

        let projects = table(
            PROJECTS.all,
            &[
                &[
                    ("CUP", "J11B0000001"),
                    ("DESCRIZIONE_SINTETICA_CUP", "Scuola primaria"),
                    ("STATO_PROGETTO", "ATTIVO"),
                    ("COSTO_PROGETTO", "1000"),
                    ("REGIONE", "LAZIO"),
                ],
                &[
                    ("CUP", "J11B0000002"),
                    ("DESCRIZIONE_SINTETICA_CUP", "Strada provinciale"),
                    ("STATO_PROGETTO", "CHIUSO"),
                    ("COSTO_PROGETTO", "250.5"),
                    ("REGIONE", "PUGLIA"),
                ],
            ],
        );
        write_batch(&projects, &paths.projects()).unwrap();

        let procurements = table(
            PROCUREMENTS.all,
            &[&[
                ("CIG", "8123456789"),
                ("CUP", "J11B0000001"),
                ("oggetto_gara", "Lavori di ristrutturazione"),
                ("importo_complessivo_gara", "900"),
            ]],
        );
        write_batch(&procurements, &paths.procurements()).unwrap();

        let store = Store::open(paths, &EngineOptions::default()).await.unwrap();
        let app = create_router(AppState::from_engine(QueryEngine::new(Arc::new(store))));
        (app, dir)
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = get(app, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_search_projects_with_filters() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get_json(app.clone(), "/api/projects?REGIONE=LAZIO,PUGLIA&limit=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = get_json(app.clone(), "/api/projects?q=scuola&limit=abc").await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["limit"], 50);
        assert_eq!(body["data"][0]["CUP"], "J11B0000001");

        // Unknown filter keys are ignored.
        let (_, body) = get_json(app, "/api/projects?NOT_A_COLUMN=x").await;
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn test_project_detail_and_not_found() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get_json(app.clone(), "/api/projects/J11B0000002").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["STATO_PROGETTO"], "CHIUSO");

        let (status, body) = get_json(app.clone(), "/api/projects/MISSING").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Progetto non trovato");

        let (status, body) = get_json(app, "/api/cig/0000000000").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "CIG non trovato");
    }

    #[tokio::test]
    async fn test_drill_down_routes() {
        let (app, _dir) = setup_test_app().await;
        let (_, body) = get_json(app.clone(), "/api/projects/J11B0000001/cig").await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["CIG"], "8123456789");

        let (_, body) = get_json(app.clone(), "/api/cig/8123456789/cup").await;
        assert_eq!(body["data"], serde_json::json!(["J11B0000001"]));

        // No awardee table was built.
        let (status, body) = get_json(app.clone(), "/api/cig/8123456789/aggiudicatari").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);

        let (_, body) = get_json(app, "/api/cig/search?SEARCH_CUP=J11B").await;
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_aggregation_routes() {
        let (app, _dir) = setup_test_app().await;
        let (status, body) = get_json(app.clone(), "/api/aggregations/REGIONE").await;
        assert_eq!(status, StatusCode::OK);
        let buckets = body.as_array().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0]["count"], 1);

        let (status, body) = get_json(app, "/api/cig/aggregations/DROP%20TABLE").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_filter_options_and_stats() {
        let (app, _dir) = setup_test_app().await;
        let (_, body) = get_json(app.clone(), "/api/filters/options").await;
        assert_eq!(body["STATO_PROGETTO"], serde_json::json!(["ATTIVO", "CHIUSO"]));

        // No stats.json: computed from the project table.
        let (status, body) = get_json(app, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totals"]["progetti"], 2);
        assert_eq!(body["totals"]["cup_unici"], 2);
    }

    #[tokio::test]
    async fn test_export_is_csv_attachment() {
        let (app, _dir) = setup_test_app().await;
        let (status, headers, body) = get(app, "/api/export?STATO_PROGETTO=ATTIVO").await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=opencup_export.csv"
        );
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("CUP;"));
        assert!(lines[1].starts_with("J11B0000001;"));
    }
}
