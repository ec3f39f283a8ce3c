//! Core abstractions for the edge cache worker.
//!
//! This crate provides the fundamental types:
//! - `EdgeRequest` - Inbound request with geo and timing context
//! - `EdgeResponse` / `BufferedResponse` - Origin and cached responses
//! - `Body` - Single-consumption response body
//! - `TimingContext` - Request lifecycle tracking

mod body;
mod context;
mod lifecycle;
mod response;

pub use body::*;
pub use context::*;
pub use lifecycle::*;
pub use response::*;
