//! Predicate builder: free text + filter map into bound SQL predicates.
//!
//! Only catalog-resolved identifiers are interpolated. Every value goes through
//! [`PredicateBuilder::bind`], which pushes the parameter and returns its
//! `$n` placeholder from the same counter, so clause order and parameter order
//! can never drift apart.

use datafusion::scalar::ScalarValue;

use crate::catalog::{
    ColumnCatalog, Dataset, NumericKind, DETAIL_MARKER_COLUMN, PNRR_FLAG_COLUMN, PROCUREMENTS,
    PROCUREMENT_PROJECT_KEY, PROJECTS,
};

use super::filters::{FilterMap, FilterValue};

/// Filter keys with dataset-specific semantics that bypass `FilterColumns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReservedKey {
    /// Project code present (`SI`) or absent (`NO`) among procurement records.
    HasCig,
    /// Upper-cased prefix match on the project code.
    SearchCup,
    /// Upper-cased prefix match on the procurement code.
    SearchCig,
    /// Inclusive lower bound on the dataset's cost column.
    CostMin,
    /// Inclusive upper bound on the dataset's cost column.
    CostMax,
    /// Recovery-plan flag set.
    OnlyPnrr,
    /// Enrichment join matched a detail snapshot.
    HasDetail,
}

impl ReservedKey {
    fn lookup(dataset: Dataset, key: &str) -> Option<Self> {
        match (dataset, key) {
            (_, "SEARCH_CUP") => Some(Self::SearchCup),
            (_, "SEARCH_CIG") => Some(Self::SearchCig),
            (Dataset::Projects, "HAS_CIG") => Some(Self::HasCig),
            (Dataset::Projects, "costo_min") => Some(Self::CostMin),
            (Dataset::Projects, "costo_max") => Some(Self::CostMax),
            (Dataset::Procurements, "importo_min") => Some(Self::CostMin),
            (Dataset::Procurements, "importo_max") => Some(Self::CostMax),
            (Dataset::Procurements, "ONLY_PNRR") => Some(Self::OnlyPnrr),
            (Dataset::Procurements, "HAS_DETAIL") => Some(Self::HasDetail),
            _ => None,
        }
    }
}

/// Conjunction of predicates with their positional parameters.
#[derive(Debug, Clone, Default)]
pub struct Predicates {
    clauses: Vec<String>,
    params: Vec<ScalarValue>,
}

impl Predicates {
    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn params(&self) -> &[ScalarValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Append a clause that carries no parameters.
    pub fn push_static(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    /// `WHERE a AND b ...`, or an empty string when there are no clauses.
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Build the predicates for a request against `dataset`.
pub fn build(query_text: &str, filters: &FilterMap, dataset: Dataset) -> Predicates {
    let mut builder = PredicateBuilder::new(dataset.catalog());
    builder.free_text(query_text);
    for (key, value) in filters.iter() {
        builder.filter(key, value);
    }
    builder.finish()
}

struct PredicateBuilder {
    catalog: &'static ColumnCatalog,
    out: Predicates,
}

impl PredicateBuilder {
    fn new(catalog: &'static ColumnCatalog) -> Self {
        Self {
            catalog,
            out: Predicates::default(),
        }
    }

    fn finish(self) -> Predicates {
        self.out
    }

    /// Push a parameter and return its placeholder.
    fn bind(&mut self, value: ScalarValue) -> String {
        self.out.params.push(value);
        format!("${}", self.out.params.len())
    }

    fn bind_str(&mut self, value: impl Into<String>) -> String {
        self.bind(ScalarValue::Utf8(Some(value.into())))
    }

    fn free_text(&mut self, query_text: &str) {
        let text = query_text.trim();
        if text.is_empty() {
            return;
        }
        let pattern = format!("%{}%", text.to_lowercase());

        let mut parts = Vec::new();
        for col in self.catalog.search_refs() {
            let ph = self.bind_str(pattern.clone());
            parts.push(format!("LOWER({}) LIKE {}", col.text_expr(), ph));
        }
        if self.catalog.dataset == Dataset::Projects {
            let ph = self.bind_str(pattern);
            parts.push(format!(
                "{} IN (SELECT DISTINCT {} FROM {} WHERE LOWER({}) LIKE {})",
                PROJECTS.key_column().quoted(),
                PROCUREMENT_PROJECT_KEY.quoted(),
                PROCUREMENTS.table,
                PROCUREMENTS.key_column().text_expr(),
                ph
            ));
        }
        self.out.clauses.push(format!("({})", parts.join(" OR ")));
    }

    fn filter(&mut self, key: &str, value: &FilterValue) {
        if value.is_empty() {
            return;
        }
        if let Some(reserved) = ReservedKey::lookup(self.catalog.dataset, key) {
            self.reserved(reserved, value);
            return;
        }
        let Some(col) = self.catalog.resolve_filter(key) else {
            tracing::debug!(key, dataset = %self.catalog.dataset, "ignoring unknown filter");
            return;
        };
        match value {
            FilterValue::Scalar(v) => {
                let ph = self.bind_str(v.clone());
                self.out.clauses.push(format!("{} = {}", col.text_expr(), ph));
            }
            FilterValue::List(items) => {
                let placeholders: Vec<String> =
                    items.iter().map(|v| self.bind_str(v.clone())).collect();
                self.out.clauses.push(format!(
                    "{} IN ({})",
                    col.text_expr(),
                    placeholders.join(", ")
                ));
            }
        }
    }

    fn reserved(&mut self, key: ReservedKey, value: &FilterValue) {
        let Some(value) = value.as_scalar() else {
            return;
        };
        let clause = match key {
            ReservedKey::HasCig => {
                let cup = PROJECTS.key_column().quoted();
                let members = format!(
                    "SELECT DISTINCT {key} FROM {table} WHERE {key} IS NOT NULL",
                    key = PROCUREMENT_PROJECT_KEY.quoted(),
                    table = PROCUREMENTS.table,
                );
                match value {
                    "SI" => format!("{} IN ({})", cup, members),
                    "NO" => format!("({cup} IS NULL OR {cup} NOT IN ({members}))"),
                    _ => return,
                }
            }
            ReservedKey::SearchCup => {
                let ph = self.bind_str(format!("{}%", value.to_uppercase()));
                match self.catalog.dataset {
                    Dataset::Projects => format!("{} LIKE {}", PROJECTS.key_column().quoted(), ph),
                    Dataset::Procurements => {
                        format!("{} LIKE {}", PROCUREMENT_PROJECT_KEY.quoted(), ph)
                    }
                }
            }
            ReservedKey::SearchCig => {
                let ph = self.bind_str(format!("{}%", value.to_uppercase()));
                match self.catalog.dataset {
                    Dataset::Projects => format!(
                        "{} IN (SELECT DISTINCT {} FROM {} WHERE {} LIKE {})",
                        PROJECTS.key_column().quoted(),
                        PROCUREMENT_PROJECT_KEY.quoted(),
                        PROCUREMENTS.table,
                        PROCUREMENTS.key_column().quoted(),
                        ph
                    ),
                    Dataset::Procurements => {
                        format!("{} LIKE {}", PROCUREMENTS.key_column().quoted(), ph)
                    }
                }
            }
            ReservedKey::CostMin | ReservedKey::CostMax => {
                let Ok(bound) = value.trim().parse::<f64>() else {
                    tracing::debug!(value, "ignoring non-numeric range bound");
                    return;
                };
                if !bound.is_finite() {
                    return;
                }
                let cost = self.catalog.cost();
                let expr = cost.cast_expr(NumericKind::Decimal);
                let op = if key == ReservedKey::CostMin { ">=" } else { "<=" };
                let ph = self.bind(ScalarValue::Float64(Some(bound)));
                format!("{} {} {}", expr, op, ph)
            }
            ReservedKey::OnlyPnrr => {
                if value != "SI" {
                    return;
                }
                format!("{} = 1", PNRR_FLAG_COLUMN.cast_expr(NumericKind::Integer))
            }
            ReservedKey::HasDetail => {
                if value != "SI" {
                    return;
                }
                format!("{} IS NOT NULL", DETAIL_MARKER_COLUMN.quoted())
            }
        };
        self.out.clauses.push(clause);
    }
}
