pub mod client;
pub mod compare;
pub mod db;
pub mod error;
pub mod generate;
pub mod plan;
pub mod schema;
pub mod step;
pub mod swagger;
pub mod tag;
pub mod values;

#[cfg(test)]
#[path = "db_tests.rs"]
mod db_tests;

#[cfg(test)]
#[path = "generate_tests.rs"]
mod generate_tests;


// Re-export commonly used types
pub use client::{RestClient, RestRequest, RestResponse};
pub use compare::Comparison;
pub use db::{MirrorDb, SchemaDb, match_all_fields, match_always};
pub use error::{Error, Result};
pub use plan::{RunSummary, StepResult, TestCase, TestHistory, TestPlan};
pub use schema::{Schema, TypeSet};
pub use step::{HistoryScope, Test, TestParams};
pub use swagger::{Method, Operation, Parameter, PathItem, Swagger};
pub use tag::{MeqaTag, get_meqa_tag};
