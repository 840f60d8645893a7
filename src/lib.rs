//! hanserver: a geotagged image feed.
//!
//! Images are harvested from external sources into watched regions and
//! served as a paginated feed ranked by distance and recency.
//!
//! # Architecture
//!
//! - **Store**: geo-indexed persistence (`MemoryStore`, `SqliteStore`)
//! - **RegionResolver**: decides which coordinates are already watched
//! - **HarvestOrchestrator**: concurrent, rate-limited fan-out to every
//!   source, returning on the first success
//! - **RankedPaginator**: stable feed windows over chunked, score-sorted
//!   store queries
//! - **FeedService** / **ApiServer**: request handling and the HTTP API
//!
//! Source adapters live in the `han-collectors` crate.

pub mod cleaner;
pub mod config;
pub mod error;
pub mod feed;
pub mod harvest;
pub mod logging;
pub mod region;
pub mod reporting;
pub mod server;
pub mod service;
pub mod store;

pub use config::HanConfig;
pub use error::{HanError, Result};
pub use feed::RankedPaginator;
pub use harvest::{HarvestOrchestrator, HarvestOutcome, HarvestSource};
pub use region::RegionResolver;
pub use server::ApiServer;
pub use service::FeedService;
pub use store::Store;
