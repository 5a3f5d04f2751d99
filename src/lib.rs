// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod criteria;
pub mod error;
pub mod fetcher;
pub mod pfclient;

// ---- Re-exports for stable public API ----
pub use crate::config::FetcherConfig;
pub use crate::criteria::{merge, Criteria, Facet, MergePolicy};
pub use crate::error::{ClientError, CriteriaMergeError, FetcherError};
pub use crate::fetcher::{
    ChannelSink, Fetcher, FetcherHandle, FetcherState, ResultSink, TickOutcome,
};
pub use crate::pfclient::types::{Animal, AnimalPage, AnimalType, Breed, Pagination};
pub use crate::pfclient::{AnimalSource, PfClient};
