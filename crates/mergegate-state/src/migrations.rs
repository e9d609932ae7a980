//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with proper constraints and indexes.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Initialize all Mergegate tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing Mergegate SurrealDB schema");

    init_instances_table(db).await?;
    init_tickets_table(db).await?;
    init_resolution_cache_table(db).await?;

    info!("Mergegate schema initialization complete");
    Ok(())
}

/// Initialize `instances` table
///
/// Constraints:
/// - `workflow_id` is unique
/// - `(repository, change_id, active)` indexed for the supersession lookup
/// - Terminal instances are retained; deletes only happen on upsert-replace
async fn init_instances_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing instances table");

    let sql = r#"
        DEFINE TABLE instances
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        -- One row per workflow instance
        DEFINE INDEX idx_workflow_id ON TABLE instances COLUMNS workflow_id UNIQUE;

        -- Supersession lookup: the active instance for a change
        DEFINE INDEX idx_change_active ON TABLE instances COLUMNS repository, change_id, active;

        -- Status listing for resume-at-startup
        DEFINE INDEX idx_status ON TABLE instances COLUMNS status;

        -- Time-ordered listing
        DEFINE INDEX idx_started_at ON TABLE instances COLUMNS started_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `tickets` table
///
/// Constraints:
/// - Append-only (no update/delete)
/// - `idempotency_key` indexed (NOT unique: duplicates are detected and
///   reconciled at the application layer, oldest canonical)
async fn init_tickets_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing tickets table");

    let sql = r#"
        DEFINE TABLE tickets
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX idx_idempotency_key ON TABLE tickets COLUMNS idempotency_key;
        DEFINE INDEX idx_external_key ON TABLE tickets COLUMNS external_key;
        DEFINE INDEX idx_ticket_created_at ON TABLE tickets COLUMNS created_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `resolution_cache` table
///
/// Constraints:
/// - `lookup_key` is unique (one live entry per identifier)
/// - Expiry enforced at read time by the store
async fn init_resolution_cache_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing resolution_cache table");

    let sql = r#"
        DEFINE TABLE resolution_cache
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX idx_lookup_key ON TABLE resolution_cache COLUMNS lookup_key UNIQUE;
        DEFINE INDEX idx_expires_at ON TABLE resolution_cache COLUMNS expires_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    Ok(())
}
