//! Edge cache policy and worker.
//!
//! This crate provides:
//! - `CacheKey` / `compute_cache_key` - Keys partitioned by country, device and WebP support
//! - `CachePolicy` - Cacheability and TTL rules by path class
//! - `Transformer` - Lightweight response transforms applied before storage
//! - `CacheStore` / `InMemoryStore` - Injected key-value cache store
//! - `Origin` / `StaticOrigin` - Upstream fetch capability
//! - `CacheWorker` - Lookup, origin fetch and background cache write
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edge_cache::{CacheWorker, InMemoryStore, StaticOrigin, OriginRoute};
//! use edge_core::EdgeRequest;
//!
//! let origin = StaticOrigin::new()
//!     .route("/about", OriginRoute::html("<html><head></head></html>"));
//! let worker = CacheWorker::new(Arc::new(origin), Arc::new(InMemoryStore::new()));
//!
//! let handled = worker.handle(EdgeRequest::get("https://example.com/about")?).await?;
//! assert_eq!(handled.status.as_str(), "MISS");
//!
//! // Persist the entry; callers on a tokio runtime can `spawn()` instead.
//! if let Some(write) = handled.pending_write {
//!     write.run().await;
//! }
//! ```

mod config;
mod headers;
mod key;
mod origin;
mod policy;
mod store;
mod transform;
mod worker;

pub use config::*;
pub use headers::*;
pub use key::*;
pub use origin::*;
pub use policy::*;
pub use store::*;
pub use transform::*;
pub use worker::*;
