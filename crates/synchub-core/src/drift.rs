//! Drift classification between an item's sync attributes and the ledger.
//!
//! The repairer gathers the facts (the item, its resolved root, the root's
//! ledger, the copies the ledger points at) and these functions turn them
//! into faults, each with exactly one repair action.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gid::Gid;
use crate::item::{ContentItem, PublishStatus};
use crate::ledger::{ConnectionLedger, ConnectionRecord, DestinationId};
use crate::types::{ItemId, NodeId};

/// How dangerous a repair action is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    /// Ledger fixes and sync id rewrites.
    Low,
    /// Trashing content or promoting roots.
    Destructive,
}

/// Which actions a repair run may apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Report only.
    #[default]
    Inspect,
    /// Low-risk actions only.
    Autorepair,
    /// Everything.
    Repair,
}

impl RepairMode {
    /// Map the administrative `autorepair` / `repair` flags. `repair` only
    /// widens an autorepair; on its own it inspects.
    pub fn from_flags(autorepair: bool, repair: bool) -> Self {
        match (autorepair, repair) {
            (true, true) => RepairMode::Repair,
            (true, false) => RepairMode::Autorepair,
            (false, _) => RepairMode::Inspect,
        }
    }

    pub fn allows(&self, risk: Risk) -> bool {
        match self {
            RepairMode::Inspect => false,
            RepairMode::Autorepair => risk == Risk::Low,
            RepairMode::Repair => true,
        }
    }
}

/// A deterministic fix for one fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    /// Drop a ledger entry of `root`.
    DeleteLedgerEntry { root: Gid, destination: DestinationId },
    /// Write a ledger entry of `root`.
    RestoreLedgerEntry {
        root: Gid,
        destination: DestinationId,
        record: ConnectionRecord,
    },
    /// Point the item's sync id somewhere else.
    RewriteSyncId { to: Gid },
    /// Rewrite the ledger of `root` from the linked copies on this network.
    RebuildLedger { root: Gid },
    /// Turn the item into an independent root.
    PromoteToRoot,
    /// Move the item to trash.
    MoveToTrash,
}

impl RepairAction {
    pub fn risk(&self) -> Risk {
        match self {
            RepairAction::DeleteLedgerEntry { .. }
            | RepairAction::RestoreLedgerEntry { .. }
            | RepairAction::RewriteSyncId { .. }
            | RepairAction::RebuildLedger { .. } => Risk::Low,
            RepairAction::PromoteToRoot | RepairAction::MoveToTrash => Risk::Destructive,
        }
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::DeleteLedgerEntry { root, destination } => {
                write!(f, "delete ledger entry {} of root {}", destination, root)
            }
            RepairAction::RestoreLedgerEntry {
                root,
                destination,
                record,
            } => write!(
                f,
                "restore ledger entry {} -> item {} of root {}",
                destination, record.item_id, root
            ),
            RepairAction::RewriteSyncId { to } => write!(f, "rewrite sync id to {}", to),
            RepairAction::RebuildLedger { root } => write!(f, "rebuild ledger of root {}", root),
            RepairAction::PromoteToRoot => f.write_str("promote to root"),
            RepairAction::MoveToTrash => f.write_str("move to trash"),
        }
    }
}

/// Kinds of drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftKind {
    /// The item's sync attributes cannot be interpreted.
    InvalidIdentity { detail: String },
    /// The root's ledger metadata cannot be interpreted.
    UnreadableLedger { root: Gid, detail: String },
    /// A ledger entry points at nothing live.
    OrphanedConnection { destination: DestinationId, item_id: ItemId },
    /// A linked copy exists but the root's ledger does not record it.
    MissingEntry { root: Gid, destination: DestinationId },
    /// The ledger records a different item for this node, and that item is
    /// not a live copy.
    StaleEntry { root: Gid, destination: DestinationId, recorded: ItemId },
    /// A sync id names an item that is not the root.
    MisdirectedLink { declared: Gid, actual: Gid },
    /// Two items claim the same root slot.
    DuplicateRoot { other: Gid },
    /// A second linked copy of the same root on one node.
    DuplicateLink { root: Gid, kept: ItemId },
    /// The root of a linked item no longer exists.
    OrphanedLink { root: Gid },
    /// The root lives on a network that is not active.
    UnreachableRemoteRoot { host: String },
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftKind::InvalidIdentity { detail } => write!(f, "invalid identity: {}", detail),
            DriftKind::UnreadableLedger { root, detail } => {
                write!(f, "unreadable ledger of root {}: {}", root, detail)
            }
            DriftKind::OrphanedConnection {
                destination,
                item_id,
            } => write!(f, "orphaned connection {} -> item {}", destination, item_id),
            DriftKind::MissingEntry { root, destination } => {
                write!(f, "missing ledger entry {} in root {}", destination, root)
            }
            DriftKind::StaleEntry {
                root,
                destination,
                recorded,
            } => write!(
                f,
                "stale ledger entry {} -> item {} in root {}",
                destination, recorded, root
            ),
            DriftKind::MisdirectedLink { declared, actual } => {
                write!(f, "misdirected link: declared {}, actual root {}", declared, actual)
            }
            DriftKind::DuplicateRoot { other } => write!(f, "duplicate root of {}", other),
            DriftKind::DuplicateLink { root, kept } => {
                write!(f, "duplicate link of {} (ledger keeps item {})", root, kept)
            }
            DriftKind::OrphanedLink { root } => write!(f, "root {} no longer exists", root),
            DriftKind::UnreachableRemoteRoot { host } => {
                write!(f, "remote network {} is not active", host)
            }
        }
    }
}

/// A classified fault with its fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: DriftKind,
    pub action: RepairAction,
}

impl Fault {
    pub fn new(kind: DriftKind, action: RepairAction) -> Self {
        Self { kind, action }
    }

    pub fn risk(&self) -> Risk {
        self.action.risk()
    }
}

/// Outcome of inspecting (and possibly repairing) one item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub node_id: NodeId,
    pub item_id: ItemId,
    pub faults: Vec<Fault>,
    /// One line per attempted or skipped action.
    pub log: Vec<String>,
    /// True when every fault was fixed (vacuously true for a clean item).
    pub repaired: bool,
}

impl RepairReport {
    pub fn new(node_id: NodeId, item_id: ItemId) -> Self {
        Self {
            node_id,
            item_id,
            faults: Vec::new(),
            log: Vec::new(),
            repaired: true,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// What the repairer found when resolving a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyLookup<'a> {
    Found(&'a ContentItem),
    Missing,
    /// On a remote network that is not active; not judged.
    Unreachable,
}

/// What the repairer found when resolving a linked item's root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLookup<'a> {
    Found {
        root: &'a ContentItem,
        ledger: &'a ConnectionLedger,
        /// The item the ledger records for this item's node, when it is a
        /// different live item.
        recorded: Option<&'a ContentItem>,
    },
    Missing,
    Unreachable { host: &'a str },
}

fn is_live(item: &ContentItem) -> bool {
    item.status != PublishStatus::Trash
}

/// Check a root's own identity.
///
/// `claimed` is the item its sync id names, when that is a different item.
pub fn classify_root_identity(root: &ContentItem, own: &Gid, claimed: Option<&ContentItem>) -> Option<Fault> {
    let declared = match &root.sync_id {
        None => {
            return Some(Fault::new(
                DriftKind::InvalidIdentity {
                    detail: format!("root {} has no sync id", own),
                },
                RepairAction::RewriteSyncId { to: own.clone() },
            ))
        }
        Some(gid) => gid.local_part(),
    };
    if declared == *own {
        return None;
    }

    match claimed {
        Some(other) if other.is_root() && is_live(other) && other.sync_id.as_ref() == Some(&declared) => Some(Fault::new(
            DriftKind::DuplicateRoot { other: declared },
            RepairAction::PromoteToRoot,
        )),
        _ => Some(Fault::new(
            DriftKind::MisdirectedLink {
                declared,
                actual: own.clone(),
            },
            RepairAction::RewriteSyncId { to: own.clone() },
        )),
    }
}

/// Check one ledger entry of `root` against the copy it points at.
pub fn classify_entry(root: &Gid, destination: &DestinationId, record: &ConnectionRecord, copy: CopyLookup<'_>) -> Option<Fault> {
    let orphaned = || {
        Some(Fault::new(
            DriftKind::OrphanedConnection {
                destination: destination.clone(),
                item_id: record.item_id,
            },
            RepairAction::DeleteLedgerEntry {
                root: root.clone(),
                destination: destination.clone(),
            },
        ))
    };

    match copy {
        CopyLookup::Unreachable => None,
        CopyLookup::Missing => orphaned(),
        CopyLookup::Found(item) => {
            let points_back = item
                .sync_id
                .as_ref()
                .is_some_and(|gid| gid.local_part() == *root);
            if item.is_linked() && points_back && is_live(item) {
                None
            } else {
                orphaned()
            }
        }
    }
}

/// Check a linked item against its root.
///
/// `destination` is how the root's ledger addresses the item's node and
/// `record` the entry that should be there.
pub fn classify_linked(
    item: &ContentItem,
    destination: &DestinationId,
    record: ConnectionRecord,
    root: RootLookup<'_>,
) -> Option<Fault> {
    let Some(gid) = item.sync_id.as_ref() else {
        return Some(Fault::new(
            DriftKind::InvalidIdentity {
                detail: format!("linked item {} has no sync id", item.id),
            },
            RepairAction::PromoteToRoot,
        ));
    };
    let declared = gid.local_part();

    let (root_item, ledger, recorded) = match root {
        RootLookup::Unreachable { host } => {
            return Some(Fault::new(
                DriftKind::UnreachableRemoteRoot {
                    host: host.to_string(),
                },
                RepairAction::PromoteToRoot,
            ))
        }
        RootLookup::Missing => {
            return Some(Fault::new(
                DriftKind::OrphanedLink { root: declared },
                RepairAction::PromoteToRoot,
            ))
        }
        RootLookup::Found {
            root,
            ledger,
            recorded,
        } => (root, ledger, recorded),
    };

    if !is_live(root_item) {
        return Some(Fault::new(
            DriftKind::OrphanedLink { root: declared },
            RepairAction::PromoteToRoot,
        ));
    }

    if !root_item.is_root() {
        // The declared root is itself a copy; follow it one hop.
        return match root_item.sync_id.as_ref() {
            Some(actual) => {
                let to = match &gid.remote_host {
                    Some(host) => actual.local_part().with_host(host),
                    None => actual.clone(),
                };
                Some(Fault::new(
                    DriftKind::MisdirectedLink {
                        declared,
                        actual: actual.local_part(),
                    },
                    RepairAction::RewriteSyncId { to },
                ))
            }
            None => Some(Fault::new(
                DriftKind::OrphanedLink { root: declared },
                RepairAction::PromoteToRoot,
            )),
        };
    }

    match ledger.get(destination) {
        Some(entry) if entry.item_id == item.id => None,
        Some(entry) => match recorded {
            Some(other) if other.id == entry.item_id => Some(Fault::new(
                DriftKind::DuplicateLink {
                    root: declared,
                    kept: entry.item_id,
                },
                RepairAction::MoveToTrash,
            )),
            _ => Some(Fault::new(
                DriftKind::StaleEntry {
                    root: declared.clone(),
                    destination: destination.clone(),
                    recorded: entry.item_id,
                },
                RepairAction::RestoreLedgerEntry {
                    root: declared,
                    destination: destination.clone(),
                    record,
                },
            )),
        },
        None => Some(Fault::new(
            DriftKind::MissingEntry {
                root: declared.clone(),
                destination: destination.clone(),
            },
            RepairAction::RestoreLedgerEntry {
                root: declared,
                destination: destination.clone(),
                record,
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SyncStatus;

    fn root_57() -> ContentItem {
        let mut root = ContentItem::new(NodeId(2), ItemId(57), "article", "a").published(1);
        root.sync_status = SyncStatus::Root;
        root.sync_id = Some(Gid::local(NodeId(2), ItemId(57)));
        root
    }

    fn copy_on_3(id: u64) -> ContentItem {
        let mut copy = ContentItem::new(NodeId(3), ItemId(id), "article", "a").published(1);
        copy.sync_status = SyncStatus::Linked;
        copy.sync_id = Some(Gid::local(NodeId(2), ItemId(57)));
        copy
    }

    #[test]
    fn test_missing_entry_is_restored() {
        let root = root_57();
        let copy = copy_on_3(10);
        let ledger = ConnectionLedger::new();
        let dest = DestinationId::Local(NodeId(3));

        let fault = classify_linked(
            &copy,
            &dest,
            ConnectionRecord::bare(ItemId(10)),
            RootLookup::Found {
                root: &root,
                ledger: &ledger,
                recorded: None,
            },
        )
        .unwrap();

        assert!(matches!(fault.kind, DriftKind::MissingEntry { .. }));
        assert_eq!(fault.risk(), Risk::Low);
        assert!(RepairMode::Autorepair.allows(fault.risk()));

        let mut healed = ledger.clone();
        healed.add_connection(&dest, ConnectionRecord::bare(ItemId(10)));
        let again = classify_linked(
            &copy,
            &dest,
            ConnectionRecord::bare(ItemId(10)),
            RootLookup::Found {
                root: &root,
                ledger: &healed,
                recorded: None,
            },
        );
        assert_eq!(again, None);
    }

    #[test]
    fn test_duplicate_link_goes_to_trash() {
        let root = root_57();
        let kept = copy_on_3(10);
        let dup = copy_on_3(11);
        let dest = DestinationId::Local(NodeId(3));
        let mut ledger = ConnectionLedger::new();
        ledger.add_connection(&dest, ConnectionRecord::bare(ItemId(10)));

        let fault = classify_linked(
            &dup,
            &dest,
            ConnectionRecord::bare(ItemId(11)),
            RootLookup::Found {
                root: &root,
                ledger: &ledger,
                recorded: Some(&kept),
            },
        )
        .unwrap();
        assert_eq!(fault.action, RepairAction::MoveToTrash);
        assert!(!RepairMode::Autorepair.allows(fault.risk()));
        assert!(RepairMode::Repair.allows(fault.risk()));
    }

    #[test]
    fn test_orphaned_connection() {
        let root = Gid::local(NodeId(2), ItemId(57));
        let dest = DestinationId::Local(NodeId(3));
        let record = ConnectionRecord::bare(ItemId(10));

        assert!(classify_entry(&root, &dest, &record, CopyLookup::Missing).is_some());
        assert!(classify_entry(&root, &dest, &record, CopyLookup::Unreachable).is_none());
        assert!(classify_entry(&root, &dest, &record, CopyLookup::Found(&copy_on_3(10))).is_none());

        let mut unlinked = copy_on_3(10);
        unlinked.unlink();
        assert!(classify_entry(&root, &dest, &record, CopyLookup::Found(&unlinked)).is_some());
    }

    #[test]
    fn test_misdirected_link_follows_one_hop() {
        let mut middle = copy_on_3(10);
        middle.node_id = NodeId(4);
        let mut item = copy_on_3(20);
        item.sync_id = Some(Gid::local(NodeId(4), ItemId(10)));
        let ledger = ConnectionLedger::new();

        let fault = classify_linked(
            &item,
            &DestinationId::Local(NodeId(3)),
            ConnectionRecord::bare(ItemId(20)),
            RootLookup::Found {
                root: &middle,
                ledger: &ledger,
                recorded: None,
            },
        )
        .unwrap();
        assert_eq!(
            fault.action,
            RepairAction::RewriteSyncId {
                to: Gid::local(NodeId(2), ItemId(57))
            }
        );
    }

    #[test]
    fn test_unreachable_and_orphaned_roots_promote() {
        let copy = copy_on_3(10);
        let dest = DestinationId::Local(NodeId(3));
        let unreachable = classify_linked(
            &copy,
            &dest,
            ConnectionRecord::bare(ItemId(10)),
            RootLookup::Unreachable { host: "far.example" },
        )
        .unwrap();
        assert_eq!(unreachable.action, RepairAction::PromoteToRoot);

        let orphaned = classify_linked(&copy, &dest, ConnectionRecord::bare(ItemId(10)), RootLookup::Missing).unwrap();
        assert!(matches!(orphaned.kind, DriftKind::OrphanedLink { .. }));
    }

    #[test]
    fn test_root_identity() {
        let root = root_57();
        let own = Gid::local(NodeId(2), ItemId(57));
        assert!(classify_root_identity(&root, &own, None).is_none());

        let mut stale = root.clone();
        stale.id = ItemId(58);
        let own_58 = Gid::local(NodeId(2), ItemId(58));
        let dup = classify_root_identity(&stale, &own_58, Some(&root)).unwrap();
        assert!(matches!(dup.kind, DriftKind::DuplicateRoot { .. }));
        assert_eq!(dup.action, RepairAction::PromoteToRoot);

        let misdirected = classify_root_identity(&stale, &own_58, None).unwrap();
        assert_eq!(misdirected.action, RepairAction::RewriteSyncId { to: own_58 });
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(RepairMode::from_flags(false, false), RepairMode::Inspect);
        assert_eq!(RepairMode::from_flags(true, false), RepairMode::Autorepair);
        assert_eq!(RepairMode::from_flags(false, true), RepairMode::Inspect);
        assert_eq!(RepairMode::from_flags(true, true), RepairMode::Repair);
        assert!(!RepairMode::Inspect.allows(Risk::Low));
    }
}
