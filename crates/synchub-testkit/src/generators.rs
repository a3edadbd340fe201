//! Proptest generators for property-based testing.

use proptest::prelude::*;

use synchub_core::{
    make_gid, ConnectionLedger, ConnectionRecord, ContentItem, DestinationId, Gid, ItemId, NodeId, PublishStatus,
};

/// Generate a NodeId.
pub fn node_id() -> impl Strategy<Value = NodeId> {
    (1u64..=64).prop_map(NodeId)
}

/// Generate an ItemId.
pub fn item_id() -> impl Strategy<Value = ItemId> {
    (1u64..=100_000).prop_map(ItemId)
}

/// Generate a network host, possibly empty.
pub fn host() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("host.example".to_string()),
        "[a-z]{1,8}(-[a-z]{1,8})?\\.example".prop_map(String::from),
    ]
}

/// Generate a GID, local or remote.
pub fn gid() -> impl Strategy<Value = Gid> {
    (node_id(), item_id(), host()).prop_map(|(node, item, host)| make_gid(node, item, Some(host.as_str())))
}

/// Generate a destination on a small set of nodes and hosts, so that
/// operations collide.
pub fn destination_id() -> impl Strategy<Value = DestinationId> {
    prop_oneof![
        (1u64..=4).prop_map(|n| DestinationId::Local(NodeId(n))),
        (1u64..=4, prop_oneof![Just("a.example"), Just("b.example")])
            .prop_map(|(n, host)| DestinationId::remote(host, NodeId(n))),
    ]
}

/// Generate a connection record.
pub fn connection_record() -> impl Strategy<Value = ConnectionRecord> {
    (item_id(), any::<bool>()).prop_map(|(item, with_locators)| {
        if with_locators {
            ConnectionRecord {
                item_id: item,
                edit_locator: format!("https://node.example/edit/{item}"),
                view_locator: format!("https://node.example/?p={item}"),
                display_locator: "https://node.example".to_string(),
            }
        } else {
            ConnectionRecord::bare(item)
        }
    })
}

/// Generate a published or draft item on a node.
pub fn content_item() -> impl Strategy<Value = ContentItem> {
    (node_id(), item_id(), "[a-z]{3,10}", any::<bool>(), 0i64..=1_700_000_000_000i64).prop_map(
        |(node, id, name, published, at)| {
            let item = ContentItem::new(node, id, "article", name);
            if published {
                item.published(at)
            } else {
                ContentItem {
                    status: PublishStatus::Draft,
                    ..item
                }
            }
        },
    )
}

/// One ledger mutation.
#[derive(Debug, Clone)]
pub enum LedgerOp {
    Add(DestinationId, ConnectionRecord),
    Remove(DestinationId),
}

impl LedgerOp {
    pub fn apply(&self, ledger: &mut ConnectionLedger) {
        match self {
            LedgerOp::Add(dest, record) => {
                ledger.add_connection(dest, record.clone());
            }
            LedgerOp::Remove(dest) => {
                ledger.remove_connection(dest);
            }
        }
    }
}

/// A sequence of ledger mutations.
#[derive(Debug, Clone)]
pub struct LedgerOps(pub Vec<LedgerOp>);

impl Arbitrary for LedgerOps {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        let op = prop_oneof![
            3 => (destination_id(), connection_record()).prop_map(|(d, r)| LedgerOp::Add(d, r)),
            1 => destination_id().prop_map(LedgerOp::Remove),
        ];
        prop::collection::vec(op, 0..32).prop_map(LedgerOps).boxed()
    }
}

/// Apply operations to an empty ledger.
pub fn apply_ops(ops: &[LedgerOp]) -> ConnectionLedger {
    let mut ledger = ConnectionLedger::new();
    for op in ops {
        op.apply(&mut ledger);
    }
    ledger
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchub_core::{membership_fingerprint, parse_gid, LedgerChange};

    proptest! {
        #[test]
        fn test_gid_string_roundtrip(gid in gid()) {
            let parsed = parse_gid(&gid.to_string()).unwrap();
            prop_assert_eq!(parsed, gid);
        }

        #[test]
        fn test_destination_string_roundtrip(dest in destination_id()) {
            let parsed: DestinationId = dest.to_string().parse().unwrap();
            prop_assert_eq!(parsed, dest);
        }

        #[test]
        fn test_add_twice_is_unchanged(ops: LedgerOps, dest in destination_id(), record in connection_record()) {
            let mut ledger = apply_ops(&ops.0);
            ledger.add_connection(&dest, record.clone());
            let snapshot = ledger.clone();

            prop_assert_eq!(ledger.add_connection(&dest, record), LedgerChange::Unchanged);
            prop_assert_eq!(ledger, snapshot);
        }

        #[test]
        fn test_remove_twice_is_unchanged(ops: LedgerOps, dest in destination_id()) {
            let mut ledger = apply_ops(&ops.0);
            ledger.remove_connection(&dest);
            let snapshot = ledger.clone();

            prop_assert_eq!(ledger.remove_connection(&dest), LedgerChange::Unchanged);
            prop_assert_eq!(ledger, snapshot);
        }

        #[test]
        fn test_canonical_form_normalizes_to_itself(ops: LedgerOps) {
            let ledger = apply_ops(&ops.0);
            let normalized = ConnectionLedger::normalize(&ledger.to_value()).unwrap();
            prop_assert_eq!(normalized, ledger);
        }

        #[test]
        fn test_fingerprint_ignores_order(ids in prop::collection::vec(item_id(), 0..16)) {
            let mut reversed = ids.clone();
            reversed.reverse();

            let fingerprint = membership_fingerprint(&ids);
            prop_assert_eq!(&fingerprint, &membership_fingerprint(&reversed));
            prop_assert_eq!(hex::decode(&fingerprint).unwrap().len(), 32);
        }

        #[test]
        fn test_unpublished_items_are_not_members(item in content_item()) {
            let condition = synchub_core::ContentCondition::new(
                synchub_core::ConditionId(1),
                synchub_core::ClusterId(1),
                item.node_id,
                "article",
            );
            prop_assert_eq!(condition.matches(&item, 1_800_000_000_000), item.is_published());
        }
    }
}
