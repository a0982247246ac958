//! Experiment records and the computed views over them
//!
//! Everything here is plain data (serde + JSON Schema); behaviour lives in
//! `engine` (pure computation) and `service` (operations over the store).

pub mod experiment;
pub mod query;
pub mod results;

pub use experiment::{
    EntityType, Experiment, ExperimentSpec, ExperimentStatus, OptimizationMetric, Variant,
    VariantCounters, VariantSpec,
};
pub use query::{ListQuery, PageWindow, SortField, SortOrder};
pub use results::*;
