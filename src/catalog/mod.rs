//! Column catalog: the allow-list behind every dynamic query fragment.
//!
//! Each dataset declares which columns exist, which are shown by default,
//! which may be filtered, searched, or need a numeric cast. Any column name
//! that arrives from a request must resolve through [`ColumnCatalog::resolve`]
//! before it can be interpolated into SQL; the returned [`ColumnRef`] is the
//! only way to obtain a quoted identifier.

mod procurements;
mod projects;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use procurements::{
    AWARD_COLUMNS, DETAIL_FIELDS, DETAIL_MARKER_COLUMN, PNRR_FLAG_COLUMN, PROCUREMENTS,
    PROCUREMENT_PROJECT_KEY,
};
pub use projects::{LOCATION_COLUMNS, PROJECTS, SUBJECT_COLUMNS};

/// Registered table name of the awardee dataset.
pub const AWARDEE_TABLE: &str = "aggiudicatari";

/// Datasets exposed through the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// Public-investment projects keyed by CUP.
    Projects,
    /// Procurement (tender) records keyed by CIG.
    Procurements,
}

impl Dataset {
    /// Static column declarations for this dataset.
    pub fn catalog(self) -> &'static ColumnCatalog {
        match self {
            Dataset::Projects => &PROJECTS,
            Dataset::Procurements => &PROCUREMENTS,
        }
    }

    /// Lower-case name used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Projects => "projects",
            Dataset::Procurements => "procurements",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL cast applied before ordering or range comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// Years, flags, counters.
    Integer,
    /// Amounts and percentages.
    Decimal,
}

impl NumericKind {
    /// Target type of the `TRY_CAST`.
    pub fn sql_type(self) -> &'static str {
        match self {
            NumericKind::Integer => "BIGINT",
            NumericKind::Decimal => "DOUBLE",
        }
    }
}

/// Per-dataset column declarations.
#[derive(Debug)]
pub struct ColumnCatalog {
    pub dataset: Dataset,
    /// Table name the store registers the dataset under.
    pub table: &'static str,
    /// Primary identifying column (not unique at row level for projects).
    pub key: &'static str,
    /// Column summed by aggregations.
    pub cost_column: &'static str,
    pub all: &'static [&'static str],
    pub default_columns: &'static [&'static str],
    pub filter_columns: &'static [&'static str],
    pub search_columns: &'static [&'static str],
    pub numeric_columns: &'static [(&'static str, NumericKind)],
}

impl ColumnCatalog {
    /// Resolve a request-supplied name against `AllColumns`.
    pub fn resolve(&self, name: &str) -> Option<ColumnRef> {
        self.all
            .iter()
            .find(|c| **c == name)
            .map(|c| ColumnRef::new(*c, self.numeric_kind(c)))
    }

    /// Resolve a name only if it is also a filter column.
    pub fn resolve_filter(&self, name: &str) -> Option<ColumnRef> {
        if self.filter_columns.contains(&name) {
            self.resolve(name)
        } else {
            None
        }
    }

    /// The key column, compared as text.
    pub fn key_column(&self) -> ColumnRef {
        ColumnRef::new(self.key, None)
    }

    /// The column aggregations sum, with its numeric cast.
    pub fn cost(&self) -> ColumnRef {
        ColumnRef::new(self.cost_column, self.numeric_kind(self.cost_column))
    }

    pub fn numeric_kind(&self, name: &str) -> Option<NumericKind> {
        self.numeric_columns
            .iter()
            .find(|(c, _)| *c == name)
            .map(|(_, kind)| *kind)
    }

    pub fn search_refs(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.search_columns
            .iter()
            .map(|c| ColumnRef::new(*c, self.numeric_kind(c)))
    }

    pub fn default_refs(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.default_columns
            .iter()
            .map(|c| ColumnRef::new(*c, self.numeric_kind(c)))
    }

    pub fn all_refs(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.all
            .iter()
            .map(|c| ColumnRef::new(*c, self.numeric_kind(c)))
    }

    /// Comma-separated quoted projection of the default columns.
    pub fn default_projection(&self) -> String {
        projection(self.default_refs())
    }

    /// Comma-separated quoted projection of every column.
    pub fn full_projection(&self) -> String {
        projection(self.all_refs())
    }
}

fn projection(columns: impl Iterator<Item = ColumnRef>) -> String {
    columns
        .map(|c| c.quoted())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A column name validated against a catalog.
///
/// Only the catalog constructs these, so every identifier reaching a query
/// string has passed the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    name: &'static str,
    numeric: Option<NumericKind>,
}

impl ColumnRef {
    pub(crate) const fn new(name: &'static str, numeric: Option<NumericKind>) -> Self {
        Self { name, numeric }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn numeric(&self) -> Option<NumericKind> {
        self.numeric
    }

    /// Double-quoted identifier (catalog names never contain quotes).
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.name)
    }

    /// Expression used for ordering: safe numeric cast for numeric columns.
    pub fn sort_expr(&self) -> String {
        match self.numeric {
            Some(kind) => self.cast_expr(kind),
            None => self.quoted(),
        }
    }

    /// `TRY_CAST` of the column; unparsable values become NULL.
    pub fn cast_expr(&self, kind: NumericKind) -> String {
        format!("TRY_CAST({} AS {})", self.quoted(), kind.sql_type())
    }

    /// Expression as text, for case-insensitive substring search.
    pub fn text_expr(&self) -> String {
        format!("CAST({} AS VARCHAR)", self.quoted())
    }
}
