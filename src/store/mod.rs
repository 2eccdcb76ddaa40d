//! Storage layer for the workflow catalog and run records.
//!
//! Collections are registered in a [`Store`] by a backend implementing
//! [`DbStore`]. `MemStore` keeps everything in memory for the lifetime of
//! the engine.

pub mod data;
mod db;
pub mod query;
mod store;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

use crate::Result;

use query::*;

pub use db::MemStore;
pub use store::{RunQuery, Store};

/// Identifiers for different storage collections.
#[derive(Debug, Clone, AsRefStr, PartialEq, Hash, Eq, EnumIter)]
pub enum StoreIden {
    /// Workflow definitions.
    #[strum(serialize = "workflows")]
    Workflows,
    /// Run records.
    #[strum(serialize = "runs")]
    Runs,
    /// Node execution records.
    #[strum(serialize = "nodes")]
    Nodes,
    /// Log entries.
    #[strum(serialize = "logs")]
    Logs,
}

/// Query result: the first `limit` matching rows and the total match count.
#[derive(Debug, Deserialize, Serialize)]
pub struct PageData<T> {
    pub count: usize,
    pub rows: Vec<T>,
}

/// Trait for types that can identify their storage collection.
pub trait DbCollectionIden {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;
}

/// Trait for database collection operations.
pub trait DbCollection: Send + Sync {
    /// The type of items stored in this collection.
    type Item;

    /// Checks if a record with the given ID exists.
    fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Finds a record by ID.
    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item>;

    /// Queries records by filter and order.
    fn query(
        &self,
        query: &Query,
    ) -> Result<PageData<Self::Item>>;

    /// Creates a new record.
    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Updates an existing record.
    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;
}

/// Trait for database store initialization.
pub trait DbStore {
    /// Registers the backend's collections with the store.
    fn init(
        &self,
        s: &Store,
    ) -> Result<()>;
}
