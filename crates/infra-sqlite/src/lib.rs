// Conveyor Infrastructure - SQLite Adapter
// Implements: JobRepository (durable job record store)

mod connection;
mod error;
mod job_repository;
mod migration;

pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use migration::{run_migrations, SCHEMA_VERSION};

// Note: sqlx::Error conversion is handled by map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
