pub mod sqlite;

pub use sqlite::{GraphSummary, SqliteStore};
