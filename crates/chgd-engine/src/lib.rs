pub mod batch;
pub mod compliance;
pub mod error;
pub mod query;
pub mod rules;
pub mod stats;
pub mod validate;

pub use error::EngineError;
pub use query::QueryEngine;
pub use rules::{ComplianceRule, RulePolicy, RuleRegistry};
pub use stats::StatsAggregator;
pub use validate::Validator;
