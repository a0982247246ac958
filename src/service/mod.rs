//! Experiment operations and the collaborators they run against
//!
//! - `store`: transactional persistence (`Store`, `InMemoryStore`)
//! - `cache`: results cache (`Cache`, `InMemoryCache`)
//! - `clock`: time source (`Clock`, `SystemClock`)
//! - `experiments`: `ExperimentService`, the operation boundary

pub mod cache;
pub mod clock;
pub mod error;
pub mod experiments;
pub mod response;
pub mod store;
pub mod validation;

pub use cache::{results_cache_key, Cache, InMemoryCache, NoOpCache};
pub use clock::{Clock, SystemClock};
pub use error::ExperimentError;
pub use experiments::{ExperimentService, ServiceConfig, MAX_PAGE_SIZE};
pub use response::OperationResult;
pub use store::{
    ExperimentUpdate, InMemoryStore, Snapshot, Store, StoreError, StoreTransaction,
};
