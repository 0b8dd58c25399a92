//! Shared primitives for the Toolgate crates
//!
//! Holds the request context handed to handlers and the trait that maps
//! domain errors onto HTTP responses.

#![allow(clippy::must_use_candidate)]

mod context;
mod error;
pub mod headers;

pub use context::RequestContext;
pub use error::HttpError;
