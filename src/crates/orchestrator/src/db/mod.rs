//! Database layer: connection management, schema, models, repositories

pub mod connection;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{DatabaseConnection, DatabasePool};
