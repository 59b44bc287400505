//! Integration tests for dataviz-agent.

pub mod live_test;
pub mod pipeline_test;
pub mod registry_test;
pub mod uri_test;
