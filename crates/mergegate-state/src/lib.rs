//! Mergegate-State: SurrealDB Backend for Mergegate
//!
//! This crate provides the persistence layer for the review orchestration
//! service: workflow instances, filed tickets, and the identity-resolution
//! cache all survive process restarts here.
//!
//! ## Key Components
//!
//! - `InstanceStore` / `TicketStore` / `ResolutionCache`: storage traits
//! - `SurrealStore`: SurrealDB-backed implementation of all three
//! - `fakes`: in-memory implementations for tests

mod error;
pub mod fakes;
mod migrations;
mod schema;
pub mod storage_traits;
mod surreal_store;

pub use error::{StorageError, StorageResult};
pub use schema::{InstanceRow, ResolutionRow, TicketRow};
pub use storage_traits::{InstanceStore, ResolutionCache, TicketStore};
pub use surreal_store::SurrealStore;
