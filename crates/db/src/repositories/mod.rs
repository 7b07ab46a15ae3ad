//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or an open transaction) as the first argument.

pub mod history_repo;
pub mod page_repo;

pub use history_repo::HistoryRepo;
pub use page_repo::PageRepo;
