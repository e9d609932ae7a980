//! SurrealDB-backed implementation of the Mergegate storage traits.
//!
//! Uses the row types in `schema` for persistence, converting to/from
//! domain types at the trait boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::info;

use mergegate_core::{
    ResolutionCacheEntry, Ticket, WorkflowId, WorkflowInstance, WorkflowStatus,
};

use crate::error::{StorageError, StorageResult};
use crate::migrations;
use crate::schema::{InstanceRow, ResolutionRow, TicketRow};
use crate::storage_traits::{InstanceStore, ResolutionCache, TicketStore};

/// SurrealDB-backed store implementing [`InstanceStore`], [`TicketStore`],
/// and [`ResolutionCache`].
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `mergegate/main`, and runs `init_schema`.
    pub async fn in_memory() -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        db.use_ns("mergegate")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment.
    ///
    /// Connects to `MERGEGATE_DB_URL` when set; otherwise falls back to
    /// local persistence under `.mergegate/db`.
    pub async fn from_env() -> StorageResult<Self> {
        if let Ok(url) = std::env::var("MERGEGATE_DB_URL") {
            let db = surrealdb::engine::any::connect(&url)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            db.use_ns("mergegate")
                .use_db("main")
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

            migrations::init_schema(&db).await?;
            info!("SurrealStore connected ({})", url);
            return Ok(Self { db });
        }

        let path = ".mergegate/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
        let url = format!("surrealkv://{}", path);
        info!(
            "No MERGEGATE_DB_URL found, using local persistence: {}",
            url
        );

        let db = surrealdb::engine::any::connect(&url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns("mergegate")
            .use_db("main")
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl InstanceStore for SurrealStore {
    async fn put_instance(&self, instance: &WorkflowInstance) -> StorageResult<()> {
        let row = InstanceRow::from_instance(instance)?;
        let wid = row.workflow_id.clone();

        // Upsert: replace any existing row for this workflow id.
        self.db
            .query("DELETE instances WHERE workflow_id = $wid; CREATE instances CONTENT $row")
            .bind(("wid", wid))
            .bind(("row", row))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_instance(&self, id: &WorkflowId) -> StorageResult<WorkflowInstance> {
        let wid = id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM instances WHERE workflow_id = $wid")
            .bind(("wid", wid))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows: Vec<InstanceRow> = res.take(0).map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::InstanceNotFound {
                workflow_id: id.0.clone(),
            })?
            .into_instance()
    }

    async fn find_active(
        &self,
        repository: &str,
        change_id: &str,
    ) -> StorageResult<Option<WorkflowInstance>> {
        let repo = repository.to_string();
        let cid = change_id.to_string();
        let mut res = self
            .db
            .query(
                "SELECT * FROM instances \
                 WHERE repository = $repo AND change_id = $cid AND active = true",
            )
            .bind(("repo", repo))
            .bind(("cid", cid))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows: Vec<InstanceRow> = res.take(0).map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter().next().map(InstanceRow::into_instance).transpose()
    }

    async fn list_by_status(
        &self,
        status: WorkflowStatus,
    ) -> StorageResult<Vec<WorkflowInstance>> {
        let label = serde_json::to_value(status)?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut res = self
            .db
            .query("SELECT * FROM instances WHERE status = $status ORDER BY started_at ASC")
            .bind(("status", label))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows: Vec<InstanceRow> = res.take(0).map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter().map(InstanceRow::into_instance).collect()
    }

    async fn list_instances(
        &self,
        repository: Option<&str>,
    ) -> StorageResult<Vec<WorkflowInstance>> {
        let rows: Vec<InstanceRow> = match repository {
            Some(repo) => {
                let repo = repo.to_string();
                let mut res = self
                    .db
                    .query(
                        "SELECT * FROM instances WHERE repository = $repo \
                         ORDER BY started_at ASC",
                    )
                    .bind(("repo", repo))
                    .await
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                res.take(0).map_err(|e| StorageError::Query(e.to_string()))?
            }
            None => {
                let mut res = self
                    .db
                    .query("SELECT * FROM instances ORDER BY started_at ASC")
                    .await
                    .map_err(|e| StorageError::Query(e.to_string()))?;
                res.take(0).map_err(|e| StorageError::Query(e.to_string()))?
            }
        };
        rows.into_iter().map(InstanceRow::into_instance).collect()
    }
}

#[async_trait]
impl TicketStore for SurrealStore {
    async fn record_ticket(&self, ticket: &Ticket) -> StorageResult<()> {
        let row = TicketRow::from_ticket(ticket)?;
        self.db
            .query("CREATE tickets CONTENT $row")
            .bind(("row", row))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn find_by_key(&self, idempotency_key: &str) -> StorageResult<Vec<Ticket>> {
        let key = idempotency_key.to_string();
        let mut res = self
            .db
            .query(
                "SELECT * FROM tickets WHERE idempotency_key = $key \
                 ORDER BY created_at ASC",
            )
            .bind(("key", key))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows: Vec<TicketRow> = res.take(0).map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn list_tickets(&self) -> StorageResult<Vec<Ticket>> {
        let mut res = self
            .db
            .query("SELECT * FROM tickets ORDER BY created_at ASC")
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows: Vec<TicketRow> = res.take(0).map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter().map(TicketRow::into_ticket).collect()
    }
}

#[async_trait]
impl ResolutionCache for SurrealStore {
    async fn get(
        &self,
        lookup_key: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ResolutionCacheEntry>> {
        let key = lookup_key.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM resolution_cache WHERE lookup_key = $key")
            .bind(("key", key.clone()))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let rows: Vec<ResolutionRow> =
            res.take(0).map_err(|e| StorageError::Query(e.to_string()))?;
        match rows.into_iter().next() {
            Some(row) => {
                let entry = row.into_entry();
                if entry.is_expired_at(now) {
                    self.db
                        .query("DELETE resolution_cache WHERE lookup_key = $key")
                        .bind(("key", key))
                        .await
                        .map_err(|e| StorageError::Query(e.to_string()))?;
                    Ok(None)
                } else {
                    Ok(Some(entry))
                }
            }
            None => Ok(None),
        }
    }

    async fn put(&self, entry: ResolutionCacheEntry) -> StorageResult<()> {
        let row = ResolutionRow::from_entry(&entry);
        let key = row.lookup_key.clone();
        self.db
            .query(
                "DELETE resolution_cache WHERE lookup_key = $key; \
                 CREATE resolution_cache CONTENT $row",
            )
            .bind(("key", key))
            .bind(("row", row))
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}
