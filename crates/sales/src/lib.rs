//! Order intake and lifecycle orchestration.
//!
//! [`OrderService`] is the entry point for callers: it reads the catalog,
//! lets the `domain` crate decide, and commits each decision to the store
//! as one atomic write.

pub mod error;
pub mod service;

pub use error::{ErrorKind, Result, SalesError};
pub use service::OrderService;
