//! Domain logic for the folio wiki.
//!
//! Everything here is storage-agnostic: the revision engine talks to
//! persistence only through the [`store`] contracts, so the same code runs
//! against PostgreSQL (`folio-db`) and the in-memory store used by tests.

pub mod clock;
pub mod error;
pub mod lock;
pub mod memory_store;
pub mod page;
pub mod patch;
pub mod pipeline;
pub mod reconstruct;
pub mod render;
pub mod service;
pub mod store;
pub mod types;
pub mod wiki;
