//! Database layer
//!
//! SQLite storage for users, pins, boards and the relations between them.
//!
//! # Usage
//!
//! ```ignore
//! use cyclone::config::DatabaseConfig;
//! use cyclone::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod query;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};
