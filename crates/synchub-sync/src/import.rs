//! Destination-side placement of distributed content.
//!
//! For each incoming item (dependents first, then the root) the importer
//! looks for the node's existing linked copy of the same GID, then for
//! equivalent content, and applies the decision from
//! [`synchub_core::conflict::decide`].

use std::collections::HashMap;
use std::sync::Arc;

use synchub_core::conflict::{decide, is_equivalent};
use synchub_core::{
    ConnectionRecord, ContentItem, DistributionAction, Gid, ImportDecision, ItemId, NodeId, SyncStatus,
};
use synchub_store::{Directory, ItemQuery, Store};

use crate::error::{Result, SyncError};
use crate::messages::{DistributionPayload, ImportOutcome, ImportReport};

/// Places payloads on the nodes of one network.
pub struct Importer<S: Store + ?Sized, D: Directory + ?Sized> {
    store: Arc<S>,
    directory: Arc<D>,
}

impl<S: Store + ?Sized, D: Directory + ?Sized> Importer<S, D> {
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self { store, directory }
    }

    /// Import a payload onto `node`.
    pub async fn import(&self, node: NodeId, payload: &DistributionPayload) -> Result<ImportReport> {
        let info = self.directory.node(node).ok_or(SyncError::UnknownNode(node))?;

        match payload.action {
            DistributionAction::Insert => {
                let mut placed: HashMap<ItemId, ItemId> = HashMap::new();
                let mut dependents = Vec::with_capacity(payload.dependents.len());

                for dependent in &payload.dependents {
                    let gid = payload.dependent_gid(dependent.id);
                    let outcome = self.place(node, &gid, dependent, payload, &placed).await?;
                    if let Some(local) = placed_id(&outcome) {
                        placed.insert(dependent.id, local);
                    }
                    dependents.push(outcome);
                }

                let root = self.place(node, &payload.gid, &payload.root, payload, &placed).await?;
                let record = root.linked_item().map(|local| ConnectionRecord {
                    item_id: local,
                    edit_locator: info.edit_locator(local),
                    view_locator: info.view_locator(local),
                    display_locator: info.base_url.clone(),
                });

                Ok(ImportReport {
                    root,
                    dependents,
                    record,
                })
            }
            DistributionAction::Trash | DistributionAction::Delete => {
                let root = self.remove(node, &payload.gid, payload.root.id, payload.action).await?;
                Ok(ImportReport {
                    root,
                    dependents: Vec::new(),
                    record: None,
                })
            }
        }
    }

    /// The node's linked copy of `gid`, trashed copies included.
    pub async fn linked_copy(&self, node: NodeId, gid: &Gid) -> Result<Option<ContentItem>> {
        let copies = self
            .store
            .query_items(
                node,
                &ItemQuery::new()
                    .with_sync_status(SyncStatus::Linked)
                    .linked_to(gid)
                    .including_trash(),
            )
            .await?;
        Ok(copies.into_iter().next())
    }

    async fn place(
        &self,
        node: NodeId,
        gid: &Gid,
        incoming: &ContentItem,
        payload: &DistributionPayload,
        placed: &HashMap<ItemId, ItemId>,
    ) -> Result<ImportOutcome> {
        let linked = self.linked_copy(node, gid).await?;

        let equivalent = match linked {
            Some(_) => None,
            None => self
                .store
                .find_by_name_and_type(node, &incoming.name, &incoming.item_type, incoming.language.as_deref())
                .await?
                .into_iter()
                .find(|candidate| is_equivalent(candidate, incoming)),
        };

        let decision = decide(incoming, linked.as_ref(), equivalent.as_ref(), &payload.policies)?;
        let dependencies: Vec<ItemId> = incoming
            .dependencies
            .iter()
            .filter_map(|dep| placed.get(dep).copied())
            .collect();

        let outcome = match decision {
            ImportDecision::UpdateLinked { local } | ImportDecision::Replace { local } => {
                let mut copy = match linked.or(equivalent) {
                    Some(copy) => copy,
                    None => return Err(SyncError::ItemNotFound { node, item: local }),
                };
                copy.apply_content(incoming);
                copy.dependencies = dependencies;
                copy.sync_status = SyncStatus::Linked;
                copy.sync_id = Some(gid.clone());
                self.store.update_item(node, &copy).await?;
                ImportOutcome::Linked {
                    source: incoming.id,
                    local,
                    decision,
                }
            }
            ImportDecision::Insert => {
                let mut copy = fresh_copy(node, incoming, dependencies);
                copy.sync_status = SyncStatus::Linked;
                copy.sync_id = Some(gid.clone());
                let stored = self.store.insert_item(node, copy).await?;
                ImportOutcome::Linked {
                    source: incoming.id,
                    local: stored.id,
                    decision,
                }
            }
            ImportDecision::Skip { local } => ImportOutcome::Skipped {
                source: incoming.id,
                existing: local,
            },
            ImportDecision::Keep => {
                let stored = self
                    .store
                    .insert_item(node, fresh_copy(node, incoming, dependencies))
                    .await?;
                ImportOutcome::Unlinked {
                    source: incoming.id,
                    local: stored.id,
                }
            }
        };

        tracing::debug!(
            node = %node,
            gid = %gid,
            decision = decision.as_str(),
            "imported item"
        );
        Ok(outcome)
    }

    async fn remove(&self, node: NodeId, gid: &Gid, source: ItemId, action: DistributionAction) -> Result<ImportOutcome> {
        let local = match self.linked_copy(node, gid).await? {
            Some(copy) => {
                match action {
                    DistributionAction::Delete => {
                        self.store.delete_item(node, copy.id).await?;
                    }
                    _ => {
                        self.store.move_to_trash(node, copy.id).await?;
                    }
                }
                tracing::debug!(node = %node, gid = %gid, action = %action, "removed linked copy");
                Some(copy.id)
            }
            None => None,
        };

        Ok(ImportOutcome::Removed { source, local })
    }
}

/// Local id holding the content after placement, linked or not.
fn placed_id(outcome: &ImportOutcome) -> Option<ItemId> {
    match outcome {
        ImportOutcome::Linked { local, .. } | ImportOutcome::Unlinked { local, .. } => Some(*local),
        ImportOutcome::Skipped { existing, .. } => Some(*existing),
        ImportOutcome::Removed { local, .. } => *local,
    }
}

fn fresh_copy(node: NodeId, incoming: &ContentItem, dependencies: Vec<ItemId>) -> ContentItem {
    let mut copy = ContentItem::new(node, ItemId(0), incoming.item_type.clone(), incoming.name.clone());
    copy.apply_content(incoming);
    copy.dependencies = dependencies;
    copy
}
