//! HTTP request handlers for the web server.

mod helpers;
mod procurements;
mod projects;
mod stats;

pub use procurements::{
    export_procurements, procurement_aggregation, procurement_awardees, procurement_detail,
    procurement_filter_options, procurement_projects, search_procurements,
};
pub use projects::{
    export_projects, project_aggregation, project_detail, project_filter_options,
    project_procurements, search_projects,
};
pub use stats::{health, stats};
