//! SQLite persistence for the valuation engine.

mod rows;
mod store;

pub use store::SqliteStore;

#[cfg(test)]
mod tests;
