//! Statement composition for the executor operations.
//!
//! Identifiers come from the catalog, values from [`Predicates`] parameters;
//! `LIMIT`/`OFFSET` are typed integers.

use crate::catalog::{ColumnCatalog, ColumnRef, AWARDEE_TABLE, PROCUREMENTS, PROCUREMENT_PROJECT_KEY};

use super::predicate::Predicates;

/// Rows returned by a keyed detail lookup.
pub const DETAIL_LIMIT: usize = 10;
/// Groups returned by an aggregation.
pub const AGGREGATE_LIMIT: usize = 30;

/// Requested sort direction; anything but `DESC` is ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// `ORDER BY` clause: requested column (if allow-listed), then the key and the
/// remaining default columns as tie-breakers. Nulls always sort last.
pub fn order_by(catalog: &ColumnCatalog, sort: Option<&str>, direction: SortDirection) -> String {
    let requested = sort.and_then(|s| catalog.resolve(s));
    let key = catalog.key_column();

    let mut keys = Vec::new();
    if let Some(col) = requested {
        keys.push(format!("{} {} NULLS LAST", col.sort_expr(), direction.as_sql()));
    }
    let tie_breakers = std::iter::once(key)
        .chain(catalog.default_refs().filter(|c| *c != key))
        .filter(|c| Some(*c) != requested);
    for col in tie_breakers {
        keys.push(format!("{} ASC NULLS LAST", col.sort_expr()));
    }
    format!("ORDER BY {}", keys.join(", "))
}

pub fn count(catalog: &ColumnCatalog, predicates: &Predicates) -> String {
    format!(
        "SELECT COUNT(*) AS total FROM {} {}",
        catalog.table,
        predicates.where_sql()
    )
}

pub fn search(
    catalog: &ColumnCatalog,
    predicates: &Predicates,
    sort: Option<&str>,
    direction: SortDirection,
    limit: usize,
    offset: usize,
) -> String {
    format!(
        "SELECT {} FROM {} {} {} LIMIT {} OFFSET {}",
        catalog.default_projection(),
        catalog.table,
        predicates.where_sql(),
        order_by(catalog, sort, direction),
        limit,
        offset
    )
}

/// Keyed lookup; the key binds as `$1`.
pub fn detail(catalog: &ColumnCatalog) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1 LIMIT {}",
        catalog.full_projection(),
        catalog.table,
        catalog.key_column().quoted(),
        DETAIL_LIMIT
    )
}

pub fn aggregate(catalog: &ColumnCatalog, field: ColumnRef, predicates: &Predicates) -> String {
    let mut scoped = predicates.clone();
    scoped.push_static(format!("{} IS NOT NULL", field.quoted()));
    scoped.push_static(format!("{} != ''", field.text_expr()));
    format!(
        "SELECT {field} AS \"value\", COUNT(*) AS \"n\", SUM({cost}) AS \"costo\" \
         FROM {table} {filter} GROUP BY {field} \
         ORDER BY \"n\" DESC, \"value\" ASC LIMIT {limit}",
        field = field.quoted(),
        cost = catalog.cost().cast_expr(crate::catalog::NumericKind::Decimal),
        table = catalog.table,
        filter = scoped.where_sql(),
        limit = AGGREGATE_LIMIT
    )
}

pub fn export(catalog: &ColumnCatalog, predicates: &Predicates, row_cap: usize) -> String {
    format!(
        "SELECT {} FROM {} {} {} LIMIT {}",
        catalog.default_projection(),
        catalog.table,
        predicates.where_sql(),
        order_by(catalog, None, SortDirection::Asc),
        row_cap
    )
}

/// Distinct non-empty values of one filter column.
pub fn filter_values(catalog: &ColumnCatalog, column: ColumnRef) -> String {
    format!(
        "SELECT DISTINCT {col} AS \"value\" FROM {table} \
         WHERE {col} IS NOT NULL AND {text} != '' ORDER BY \"value\"",
        col = column.quoted(),
        text = column.text_expr(),
        table = catalog.table
    )
}

/// Procurement rows referencing a project code (`$1`).
pub fn procurements_for_project() -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY {} ASC",
        PROCUREMENTS.full_projection(),
        PROCUREMENTS.table,
        PROCUREMENT_PROJECT_KEY.quoted(),
        PROCUREMENTS.key_column().quoted()
    )
}

/// Project codes referenced by a procurement code (`$1`).
pub fn projects_for_procurement() -> String {
    format!(
        "SELECT DISTINCT {cup} AS \"CUP\" FROM {table} \
         WHERE {cig} = $1 AND {cup} IS NOT NULL ORDER BY \"CUP\"",
        cup = PROCUREMENT_PROJECT_KEY.quoted(),
        cig = PROCUREMENTS.key_column().quoted(),
        table = PROCUREMENTS.table
    )
}

/// Awardees of a procurement code (`$1`).
pub fn awardees_for_procurement() -> String {
    format!(
        "SELECT * FROM {} WHERE \"CIG\" = $1 \
         ORDER BY \"ruolo\" ASC NULLS LAST, \"denominazione\" ASC NULLS LAST",
        AWARDEE_TABLE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Dataset, PROJECTS};
    use crate::query::filters::FilterMap;
    use crate::query::predicate;

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("DESC"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::parse("ASC"), SortDirection::Asc);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Asc);
    }

    #[test]
    fn test_order_by_unknown_column_falls_back_to_key() {
        let unknown = order_by(&PROJECTS, Some("nope; DROP"), SortDirection::Desc);
        let none = order_by(&PROJECTS, None, SortDirection::Desc);
        assert_eq!(unknown, none);
        assert!(none.starts_with("ORDER BY \"CUP\" ASC NULLS LAST"));
        assert!(!none.contains("nope"));
    }

    #[test]
    fn test_order_by_numeric_column_casts_and_keeps_tie_breakers() {
        let sql = order_by(&PROJECTS, Some("COSTO_PROGETTO"), SortDirection::Desc);
        assert!(sql.starts_with(
            "ORDER BY TRY_CAST(\"COSTO_PROGETTO\" AS DOUBLE) DESC NULLS LAST, \"CUP\" ASC NULLS LAST"
        ));
        // Sorted column is not repeated as a tie-breaker.
        assert_eq!(sql.matches("COSTO_PROGETTO").count(), 1);
        assert!(sql.contains("\"COMUNE\" ASC NULLS LAST"));
    }

    #[test]
    fn test_order_by_key_column_is_not_repeated() {
        let sql = order_by(&PROCUREMENTS, Some("CIG"), SortDirection::Desc);
        assert!(sql.starts_with("ORDER BY \"CIG\" DESC NULLS LAST, \"CUP\" ASC NULLS LAST"));
        assert_eq!(sql.matches("\"CIG\"").count(), 1);
    }

    #[test]
    fn test_search_statement_shape() {
        let filters = FilterMap::new().with("REGIONE", "LAZIO");
        let p = predicate::build("", &filters, Dataset::Projects);
        let sql = search(&PROJECTS, &p, None, SortDirection::Asc, 20, 40);
        assert!(sql.starts_with("SELECT \"CUP\", \"DESCRIZIONE_SINTETICA_CUP\""));
        assert!(sql.contains("FROM progetti WHERE CAST(\"REGIONE\" AS VARCHAR) = $1 ORDER BY"));
        assert!(sql.ends_with("LIMIT 20 OFFSET 40"));
    }

    #[test]
    fn test_aggregate_appends_non_empty_guard_after_predicates() {
        let filters = FilterMap::new().with("STATO_PROGETTO", "ATTIVO");
        let p = predicate::build("", &filters, Dataset::Projects);
        let field = PROJECTS.resolve("REGIONE").unwrap();
        let sql = aggregate(&PROJECTS, field, &p);
        assert!(sql.contains(
            "WHERE CAST(\"STATO_PROGETTO\" AS VARCHAR) = $1 AND \"REGIONE\" IS NOT NULL AND CAST(\"REGIONE\" AS VARCHAR) != ''"
        ));
        assert!(sql.contains("SUM(TRY_CAST(\"COSTO_PROGETTO\" AS DOUBLE))"));
        assert!(sql.ends_with("ORDER BY \"n\" DESC, \"value\" ASC LIMIT 30"));
        // The caller's predicates are untouched.
        assert_eq!(p.clauses().len(), 1);
    }

    #[test]
    fn test_export_uses_default_order_and_cap() {
        let p = predicate::build("", &FilterMap::new(), Dataset::Procurements);
        let sql = export(&PROCUREMENTS, &p, 100_000);
        assert!(sql.contains("FROM cig  ORDER BY \"CIG\" ASC NULLS LAST"));
        assert!(sql.ends_with("LIMIT 100000"));
    }
}
