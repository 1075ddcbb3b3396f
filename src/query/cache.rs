//! Read-through caches for the totals and the filter option lists.
//!
//! The store is immutable for the life of the process, so entries never
//! expire. Slots are filled on first access; concurrent first accesses may
//! both compute, and the later value is simply dropped.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde_json::Value;

use crate::catalog::Dataset;
use crate::store::Statistics;

/// Filter column name to its sorted distinct values.
pub type FilterOptions = BTreeMap<String, Vec<Value>>;

#[derive(Default)]
pub struct QueryCache {
    statistics: OnceLock<Statistics>,
    project_options: OnceLock<FilterOptions>,
    procurement_options: OnceLock<FilterOptions>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_statistics(&self) -> Option<Statistics> {
        self.statistics.get().cloned()
    }

    /// Store the totals, returning whichever value won the slot.
    pub fn set_statistics(&self, stats: Statistics) -> Statistics {
        self.statistics.get_or_init(|| stats).clone()
    }

    pub fn get_filter_options(&self, dataset: Dataset) -> Option<FilterOptions> {
        self.options_slot(dataset).get().cloned()
    }

    pub fn set_filter_options(&self, dataset: Dataset, options: FilterOptions) -> FilterOptions {
        self.options_slot(dataset).get_or_init(|| options).clone()
    }

    fn options_slot(&self, dataset: Dataset) -> &OnceLock<FilterOptions> {
        match dataset {
            Dataset::Projects => &self.project_options,
            Dataset::Procurements => &self.procurement_options,
        }
    }
}
