//! SQLite implementation of the Store trait.
//!
//! The persistent backend. It uses rusqlite with bundled SQLite, wrapped in
//! async via `tokio::task::spawn_blocking`. Structured values (items,
//! clusters, reviews, membership lists) are stored as CBOR blobs next to the
//! columns queries filter on.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use synchub_core::{
    Cluster, ClusterId, ConditionId, ContentItem, DestinationId, DistributionAction,
    DistributionId, DistributionItem, DistributionStatus, Gid, ItemId, NodeId, PublishStatus,
    ReviewId, ReviewRecord,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ItemQuery, MembershipSnapshot, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the runtime threads.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("connection mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| StoreError::InvalidData(format!("id {} is out of SQLite integer range", id)))
}

fn stored_id(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| StoreError::InvalidData(format!("negative stored id {}", id)))
}

fn write_item(conn: &Connection, node: NodeId, item: &ContentItem) -> Result<()> {
    let data = to_cbor(item)?;
    conn.execute(
        "INSERT OR REPLACE INTO items (
            node_id, item_id, item_type, name, status, language, sync_status, sync_root, data
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            sql_id(node.0)?,
            sql_id(item.id.0)?,
            item.item_type,
            item.name,
            item.status.as_str(),
            item.language,
            item.sync_status.as_str(),
            item.sync_id.as_ref().map(|gid| gid.local_part().to_string()),
            data,
        ],
    )?;
    Ok(())
}

/// Raw distribution row, converted outside the rusqlite closure.
type DistributionRow = (i64, String, String, String, String, i64, i64, i64, Option<String>);

const DISTRIBUTION_COLUMNS: &str =
    "id, root_gid, destination_id, action, status, attempts, enqueued_at, updated_at, last_error";

fn read_distribution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DistributionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn distribution_from_row(row: DistributionRow) -> Result<DistributionItem> {
    let (id, gid, dest, action, status, attempts, enqueued_at, updated_at, last_error) = row;
    Ok(DistributionItem {
        id: DistributionId(stored_id(id)?),
        root_gid: gid
            .parse::<Gid>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?,
        destination_id: dest
            .parse::<DestinationId>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?,
        action: DistributionAction::from_str_lossy(&action),
        status: DistributionStatus::from_str_lossy(&status),
        attempts: attempts as u32,
        enqueued_at,
        updated_at,
        last_error,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_item(&self, node: NodeId, id: ItemId) -> Result<Option<ContentItem>> {
        let data: Option<Vec<u8>> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT data FROM items WHERE node_id = ?1 AND item_id = ?2",
                    params![sql_id(node.0)?, sql_id(id.0)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        data.map(|bytes| from_cbor(&bytes)).transpose()
    }

    async fn insert_item(&self, node: NodeId, mut item: ContentItem) -> Result<ContentItem> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if item.id == ItemId(0) {
                let next: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(item_id), 0) + 1 FROM items WHERE node_id = ?1",
                    params![sql_id(node.0)?],
                    |row| row.get(0),
                )?;
                item.id = ItemId(stored_id(next)?);
            }
            item.node_id = node;
            write_item(&tx, node, &item)?;
            tx.commit()?;
            Ok(item)
        })
        .await
    }

    async fn update_item(&self, node: NodeId, item: &ContentItem) -> Result<()> {
        let mut item = item.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM items WHERE node_id = ?1 AND item_id = ?2)",
                params![sql_id(node.0)?, sql_id(item.id.0)?],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::NotFound(format!("item {} on node {}", item.id, node)));
            }
            item.node_id = node;
            write_item(&tx, node, &item)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_item(&self, node: NodeId, id: ItemId) -> Result<bool> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM item_meta WHERE node_id = ?1 AND item_id = ?2",
                params![sql_id(node.0)?, sql_id(id.0)?],
            )?;
            let removed = tx.execute(
                "DELETE FROM items WHERE node_id = ?1 AND item_id = ?2",
                params![sql_id(node.0)?, sql_id(id.0)?],
            )?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn move_to_trash(&self, node: NodeId, id: ItemId) -> Result<bool> {
        match self.get_item(node, id).await? {
            Some(mut item) => {
                item.status = PublishStatus::Trash;
                self.update_item(node, &item).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_items(&self, node: NodeId, query: &ItemQuery) -> Result<Vec<ContentItem>> {
        let item_type = query.item_type.clone();
        let sync_root = query.sync_id.as_ref().map(|gid| gid.local_part().to_string());

        let blobs: Vec<Vec<u8>> = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT data FROM items
                     WHERE node_id = ?1
                       AND (?2 IS NULL OR item_type = ?2)
                       AND (?3 IS NULL OR sync_root = ?3)
                     ORDER BY item_id",
                )?;
                let rows = stmt
                    .query_map(params![sql_id(node.0)?, item_type, sync_root], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut items = Vec::with_capacity(blobs.len());
        for bytes in blobs {
            let item: ContentItem = from_cbor(&bytes)?;
            if query.matches(&item) {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn find_by_name_and_type(
        &self,
        node: NodeId,
        name: &str,
        item_type: &str,
        language: Option<&str>,
    ) -> Result<Vec<ContentItem>> {
        let name = name.to_string();
        let item_type = item_type.to_string();
        let language = language.map(str::to_string);

        let blobs: Vec<Vec<u8>> = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT data FROM items
                     WHERE node_id = ?1 AND name = ?2 AND item_type = ?3
                       AND status != 'trash'
                       AND (?4 IS NULL OR language = ?4)
                     ORDER BY item_id",
                )?;
                let rows = stmt
                    .query_map(params![sql_id(node.0)?, name, item_type, language], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        blobs.iter().map(|bytes| from_cbor(bytes)).collect()
    }

    async fn get_metadata(&self, node: NodeId, item: ItemId, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        let raw: Option<String> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT meta_value FROM item_meta
                     WHERE node_id = ?1 AND item_id = ?2 AND meta_key = ?3",
                    params![sql_id(node.0)?, sql_id(item.0)?, key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        // Values written by other tools may not be JSON; surface them as strings.
        Ok(raw.map(|text| serde_json::from_str(&text).unwrap_or(Value::String(text))))
    }

    async fn set_metadata(&self, node: NodeId, item: ItemId, key: &str, value: &Value) -> Result<()> {
        let key = key.to_string();
        let text = serde_json::to_string(value)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO item_meta (node_id, item_id, meta_key, meta_value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(node_id, item_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                params![sql_id(node.0)?, sql_id(item.0)?, key, text],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_metadata(&self, node: NodeId, item: ItemId, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM item_meta WHERE node_id = ?1 AND item_id = ?2 AND meta_key = ?3",
                params![sql_id(node.0)?, sql_id(item.0)?, key],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let blobs: Vec<Vec<u8>> = self
            .blocking(|conn| {
                let mut stmt = conn.prepare("SELECT data FROM clusters ORDER BY cluster_id")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        blobs.iter().map(|bytes| from_cbor(bytes)).collect()
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<Option<Cluster>> {
        let data: Option<Vec<u8>> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT data FROM clusters WHERE cluster_id = ?1",
                    params![sql_id(id.0)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        data.map(|bytes| from_cbor(&bytes)).transpose()
    }

    async fn upsert_cluster(&self, cluster: &Cluster) -> Result<()> {
        let id = cluster.id;
        let data = to_cbor(cluster)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO clusters (cluster_id, data) VALUES (?1, ?2)",
                params![sql_id(id.0)?, data],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_distribution(&self, mut item: DistributionItem) -> Result<DistributionItem> {
        let row = item.clone();
        let id = self
            .blocking(move |conn| {
                conn.execute(
                    "INSERT INTO distribution_items (
                        root_gid, destination_id, action, status, attempts,
                        enqueued_at, updated_at, last_error
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.root_gid.to_string(),
                        row.destination_id.to_string(),
                        row.action.as_str(),
                        row.status.as_str(),
                        row.attempts as i64,
                        row.enqueued_at,
                        row.updated_at,
                        row.last_error,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        item.id = DistributionId(stored_id(id)?);
        Ok(item)
    }

    async fn get_distribution(&self, id: DistributionId) -> Result<Option<DistributionItem>> {
        let row = self
            .blocking(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM distribution_items WHERE id = ?1", DISTRIBUTION_COLUMNS),
                    params![sql_id(id.0)?],
                    read_distribution_row,
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        row.map(distribution_from_row).transpose()
    }

    async fn update_distribution(&self, item: &DistributionItem) -> Result<()> {
        let item = item.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE distribution_items
                 SET root_gid = ?2, destination_id = ?3, action = ?4, status = ?5,
                     attempts = ?6, enqueued_at = ?7, updated_at = ?8, last_error = ?9
                 WHERE id = ?1",
                params![
                    sql_id(item.id.0)?,
                    item.root_gid.to_string(),
                    item.destination_id.to_string(),
                    item.action.as_str(),
                    item.status.as_str(),
                    item.attempts as i64,
                    item.enqueued_at,
                    item.updated_at,
                    item.last_error,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("distribution item {}", item.id)));
            }
            Ok(())
        })
        .await
    }

    async fn list_distributions(&self, status: Option<DistributionStatus>) -> Result<Vec<DistributionItem>> {
        let status = status.map(|s| s.as_str());
        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM distribution_items WHERE (?1 IS NULL OR status = ?1) ORDER BY id",
                    DISTRIBUTION_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status], read_distribution_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(distribution_from_row).collect()
    }

    async fn delete_distribution(&self, id: DistributionId) -> Result<bool> {
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM distribution_items WHERE id = ?1",
                params![sql_id(id.0)?],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn insert_review(&self, mut review: ReviewRecord) -> Result<ReviewRecord> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let next: i64 = tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM reviews", [], |row| row.get(0))?;
            review.id = ReviewId(stored_id(next)?);
            tx.execute(
                "INSERT INTO reviews (id, node_id, item_id, state, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    next,
                    sql_id(review.source_node_id.0)?,
                    sql_id(review.item_id.0)?,
                    review.state.as_str(),
                    to_cbor(&review)?,
                    review.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok(review)
        })
        .await
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<ReviewRecord>> {
        let data: Option<Vec<u8>> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT data FROM reviews WHERE id = ?1",
                    params![sql_id(id.0)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        data.map(|bytes| from_cbor(&bytes)).transpose()
    }

    async fn latest_review(&self, node: NodeId, item: ItemId) -> Result<Option<ReviewRecord>> {
        let data: Option<Vec<u8>> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT data FROM reviews WHERE node_id = ?1 AND item_id = ?2
                     ORDER BY id DESC LIMIT 1",
                    params![sql_id(node.0)?, sql_id(item.0)?],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        data.map(|bytes| from_cbor(&bytes)).transpose()
    }

    async fn update_review(&self, review: &ReviewRecord) -> Result<()> {
        let id = review.id;
        let state = review.state.as_str();
        let updated_at = review.updated_at;
        let data = to_cbor(review)?;
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE reviews SET state = ?2, data = ?3, updated_at = ?4 WHERE id = ?1",
                params![sql_id(id.0)?, state, data, updated_at],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("review {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn get_membership(&self, condition: ConditionId) -> Result<Option<MembershipSnapshot>> {
        let row: Option<(Vec<u8>, String, i64, i64)> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT members, fingerprint, checked_at, next_run_at
                     FROM condition_members WHERE condition_id = ?1",
                    params![sql_id(condition.0)?],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        match row {
            None => Ok(None),
            Some((members, fingerprint, checked_at, next_run_at)) => Ok(Some(MembershipSnapshot {
                condition_id: condition,
                members: from_cbor(&members)?,
                fingerprint,
                checked_at,
                next_run_at,
            })),
        }
    }

    async fn put_membership(&self, snapshot: &MembershipSnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        let members = to_cbor(&snapshot.members)?;
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO condition_members
                    (condition_id, members, fingerprint, checked_at, next_run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sql_id(snapshot.condition_id.0)?,
                    members,
                    snapshot.fingerprint,
                    snapshot.checked_at,
                    snapshot.next_run_at,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
