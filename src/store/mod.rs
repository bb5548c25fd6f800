//! Local persistence for resumable onboarding state.

pub mod libsql_backend;
mod migrations;
pub mod profile;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use profile::{MemoryProfileStore, ProfileStore, SqlProfileStore};
pub use traits::Database;
