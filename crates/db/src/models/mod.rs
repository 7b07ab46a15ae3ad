pub mod history;
pub mod page;
