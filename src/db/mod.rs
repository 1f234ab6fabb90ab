//! SQLite-backed session store.
//!
//! All statements run on one dedicated thread that owns the connection;
//! async callers hand it closures through `Database::execute`.

pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;
mod store;

pub use connection::Database;
pub use models::{SessionRow, WeeklyVitalsRow};
