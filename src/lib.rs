//! dataviz-agent: natural-language questions over registered databases,
//! answered with SQL, rows, and chart-ready data.
//!
//! The library exposes the core modules for the binary and integration tests.

pub mod api;
pub mod cli;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod probe;
pub mod reasoning;
pub mod registry;
pub mod safety;
pub mod viz;
