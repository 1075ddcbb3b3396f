//! OpenCUP - public-investment project and procurement dataset explorer.
//!
//! Raw OpenCUP extracts and ANAC procurement archives are ingested into a
//! Parquet store, which is then served through a filtered query engine and
//! a JSON/CSV HTTP API.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod query;
pub mod server;
pub mod store;
