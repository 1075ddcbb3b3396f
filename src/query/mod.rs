//! Filtered query engine over the columnar store.
//!
//! Request handlers hold an [`Arc<QueryEngine>`]; it owns the shared store
//! handle and the two read-through caches. Bad columns and unparsable values
//! degrade to ignored filters, the default sort or empty results. Only store
//! failures surface as errors.

mod cache;
mod export;
pub mod filters;
pub mod predicate;
pub mod sql;

use std::sync::Arc;

use datafusion::scalar::ScalarValue;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::Dataset;
use crate::store::{compute_statistics, read_statistics, Row, Statistics, Store, StoreError};

pub use cache::{FilterOptions, QueryCache};
pub use export::{ExportStream, DELIMITER, EXPORT_ROW_CAP};
pub use filters::{FilterMap, FilterValue};
pub use predicate::Predicates;
pub use sql::SortDirection;

/// Query failures are store failures; everything else degrades locally.
pub type QueryError = StoreError;

/// Page size when the caller gives none.
pub const DEFAULT_LIMIT: usize = 50;
/// Hard cap on a page, whatever the caller asks.
pub const MAX_LIMIT: usize = 200;

/// A search/aggregate/export request in its parsed form.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub filters: FilterMap,
    pub sort: Option<String>,
    pub order: SortDirection,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchRequest {
    /// Lenient parse of raw query-string pairs.
    ///
    /// Unparsable `limit`/`offset` fall back to their defaults.
    pub fn from_query_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)> + Clone) -> Self {
        let mut request = SearchRequest {
            filters: FilterMap::from_query_pairs(pairs.clone()),
            ..Default::default()
        };
        for (key, value) in pairs {
            match key {
                "q" => request.query = value.to_string(),
                "sort" if !value.is_empty() => request.sort = Some(value.to_string()),
                "order" => request.order = SortDirection::parse(value),
                "limit" => request.limit = value.trim().parse().ok(),
                "offset" => request.offset = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
        request
    }

    pub fn predicates(&self, dataset: Dataset) -> Predicates {
        predicate::build(&self.query, &self.filters, dataset)
    }

    /// Requested page size after the default and the cap.
    pub fn page_size(&self) -> usize {
        clamp_limit(self.limit)
    }
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub data: Vec<Row>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// One aggregation group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub value: Value,
    pub count: u64,
    pub costo: Option<f64>,
}

pub struct QueryEngine {
    store: Arc<Store>,
    cache: QueryCache,
}

impl QueryEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            cache: QueryCache::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Exact number of rows matching `predicates`.
    pub async fn count(&self, dataset: Dataset, predicates: &Predicates) -> Result<u64, QueryError> {
        let sql = sql::count(dataset.catalog(), predicates);
        let rows = self.store.rows(&sql, predicates.params()).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Ordered page of default columns. `limit` is capped at [`MAX_LIMIT`].
    pub async fn search(
        &self,
        dataset: Dataset,
        predicates: &Predicates,
        sort: Option<&str>,
        direction: SortDirection,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Row>, QueryError> {
        let limit = limit.min(MAX_LIMIT);
        let sql = sql::search(dataset.catalog(), predicates, sort, direction, limit, offset);
        self.store.rows(&sql, predicates.params()).await
    }

    /// Count and page for one request, run together.
    pub async fn search_page(
        &self,
        dataset: Dataset,
        request: &SearchRequest,
    ) -> Result<SearchPage, QueryError> {
        let predicates = request.predicates(dataset);
        let limit = request.page_size();
        let (total, data) = tokio::try_join!(
            self.count(dataset, &predicates),
            self.search(
                dataset,
                &predicates,
                request.sort.as_deref(),
                request.order,
                limit,
                request.offset
            )
        )?;
        Ok(SearchPage {
            data,
            total,
            limit,
            offset: request.offset,
        })
    }

    /// Up to ten full-width rows for `key`. Empty means not found.
    pub async fn detail(&self, dataset: Dataset, key: &str) -> Result<Vec<Row>, QueryError> {
        let sql = sql::detail(dataset.catalog());
        self.store.rows(&sql, &[utf8(key)]).await
    }

    /// Top groups of `field` by count, with summed cost. Unknown fields
    /// return no groups.
    pub async fn aggregate(
        &self,
        dataset: Dataset,
        field: &str,
        predicates: &Predicates,
    ) -> Result<Vec<AggregateBucket>, QueryError> {
        let catalog = dataset.catalog();
        let Some(column) = catalog.resolve(field) else {
            tracing::debug!(field, %dataset, "ignoring aggregation on unknown column");
            return Ok(Vec::new());
        };
        let sql = sql::aggregate(catalog, column, predicates);
        let rows = self.store.rows(&sql, predicates.params()).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| AggregateBucket {
                value: row.remove("value").unwrap_or(Value::Null),
                count: row.get("n").and_then(Value::as_u64).unwrap_or(0),
                costo: row.get("costo").and_then(Value::as_f64),
            })
            .collect())
    }

    /// Default-ordered export of up to `row_cap` rows, streamed.
    pub async fn export(
        &self,
        dataset: Dataset,
        predicates: &Predicates,
        row_cap: usize,
    ) -> Result<ExportStream, QueryError> {
        let catalog = dataset.catalog();
        let sql = sql::export(catalog, predicates, row_cap);
        let batches = self
            .store
            .sql(&sql, predicates.params())
            .await?
            .execute_stream()
            .await?;
        Ok(export::csv_stream(catalog, batches))
    }

    /// Pre-aggregated totals; computed from the project table when no
    /// snapshot was written.
    pub async fn statistics(&self) -> Result<Statistics, QueryError> {
        if let Some(stats) = self.cache.get_statistics() {
            return Ok(stats);
        }
        let stats = match read_statistics(&self.store.paths().stats()).await? {
            Some(stats) => stats,
            None => {
                tracing::info!("statistics snapshot missing, computing from project table");
                compute_statistics(self.store.context()).await?
            }
        };
        Ok(self.cache.set_statistics(stats))
    }

    /// Sorted distinct values of every filter column.
    pub async fn filter_options(&self, dataset: Dataset) -> Result<FilterOptions, QueryError> {
        if let Some(options) = self.cache.get_filter_options(dataset) {
            return Ok(options);
        }
        let catalog = dataset.catalog();
        let mut options = FilterOptions::new();
        for column in catalog.filter_columns.iter().filter_map(|c| catalog.resolve(c)) {
            let sql = sql::filter_values(catalog, column);
            let values = self
                .store
                .rows(&sql, &[])
                .await?
                .into_iter()
                .filter_map(|mut row| row.remove("value"))
                .collect();
            options.insert(column.name().to_string(), values);
        }
        Ok(self.cache.set_filter_options(dataset, options))
    }

    /// Procurement rows referencing a project code.
    pub async fn procurements_for_project(&self, cup: &str) -> Result<Vec<Row>, QueryError> {
        self.store
            .rows(&sql::procurements_for_project(), &[utf8(cup)])
            .await
    }

    /// Distinct project codes a procurement code points to.
    pub async fn projects_for_procurement(&self, cig: &str) -> Result<Vec<String>, QueryError> {
        let rows = self
            .store
            .rows(&sql::projects_for_procurement(), &[utf8(cig)])
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove("CUP") {
                Some(Value::String(cup)) => Some(cup),
                _ => None,
            })
            .collect())
    }

    /// Awardees of a procurement code; empty when the table was never built.
    pub async fn awardees_for_procurement(&self, cig: &str) -> Result<Vec<Row>, QueryError> {
        if !self.store.has_awardees() {
            return Ok(Vec::new());
        }
        self.store
            .rows(&sql::awardees_for_procurement(), &[utf8(cig)])
            .await
    }
}

fn utf8(value: &str) -> ScalarValue {
    ScalarValue::Utf8(Some(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_query_pairs() {
        let pairs = vec![
            ("q", "scuola"),
            ("REGIONE", "LAZIO,PUGLIA"),
            ("sort", "COSTO_PROGETTO"),
            ("order", "desc"),
            ("limit", "500"),
            ("offset", "-3"),
        ];
        let request = SearchRequest::from_query_pairs(pairs.iter().copied());
        assert_eq!(request.query, "scuola");
        assert_eq!(request.sort.as_deref(), Some("COSTO_PROGETTO"));
        assert_eq!(request.order, SortDirection::Desc);
        assert_eq!(request.page_size(), MAX_LIMIT);
        assert_eq!(request.offset, 0);
        assert_eq!(
            request.filters.get("REGIONE"),
            Some(&FilterValue::List(vec!["LAZIO".into(), "PUGLIA".into()]))
        );
        assert_eq!(request.filters.len(), 1);
    }

    #[test]
    fn test_limit_defaults_and_cap() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);

        let request = SearchRequest::from_query_pairs(vec![("limit", "abc")]);
        assert_eq!(request.page_size(), DEFAULT_LIMIT);
    }
}
