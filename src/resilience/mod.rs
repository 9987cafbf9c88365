//! Outbound request plumbing: one shared token slot, one shared breaker,
//! and the dispatcher that composes them with timeout and retry.

mod circuit_breaker;
mod dispatcher;
mod error;
mod token_cache;

pub use circuit_breaker::*;
pub use dispatcher::*;
pub use error::*;
pub use token_cache::*;
