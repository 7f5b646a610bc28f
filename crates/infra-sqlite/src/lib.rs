// Drover Infrastructure - SQLite Adapter
// Implements: QueueTransport (Poller, Queued, QueueCount, QueueInit, QueueWriter)

mod connection;
mod error;
mod migration;
mod queue;
mod transport;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue::{SqliteMessage, SqliteQueue};
pub use transport::{SqliteTransport, DEFAULT_LEASE};

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
