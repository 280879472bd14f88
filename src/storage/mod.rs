pub mod postgres;
pub mod sqlite;
pub mod trait_def;

#[cfg(test)]
mod patch_tests;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};
