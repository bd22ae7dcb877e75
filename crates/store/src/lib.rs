//! Backend client layer for twinchat.
//!
//! One narrow CRUD contract, [`DocumentStore`], with a driver per region:
//!
//! - **global**: [`PostgresStore`], a `jsonb` documents table
//! - **cn**: [`CloudbaseStore`], an HTTP document database API
//! - **development/tests**: [`MemoryStore`]
//!
//! [`BackendRegistry`] hands out one lazily-connected client per region and
//! [`Repository`] adds typed access to the record [`models`].

pub mod cloudbase;
pub mod document;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod registry;
pub mod repository;

pub use cloudbase::CloudbaseStore;
pub use document::{
    Direction, Document, DocumentStore, Filter, FilterOp, Order, Query, from_document, patch,
    to_document,
};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use registry::BackendRegistry;
pub use repository::Repository;

use sea_orm::DatabaseConnection;
use twinchat_common::AppError;

/// Run pending migrations on the global store.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))
}
