use super::*;

use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Clone, Debug)]
enum Op {
    Insert(u16),
    Delete(u16),
    Exists(u16),
}

fn key_strategy() -> impl Strategy<Value = u16> + Clone {
    // Narrow range so deletes and duplicate inserts actually hit.
    0u16..300
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => key.clone().prop_map(Op::Insert),
        35 => key.clone().prop_map(Op::Delete),
        15 => key.prop_map(Op::Exists),
    ];
    prop::collection::vec(op, 0..=1500)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 20_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_btreeset(t in 2usize..6, ops in ops_strategy()) {
        let mut tree: BTree<u16> = BTree::in_memory(t).unwrap();
        let mut model: BTreeSet<u16> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(key) => {
                    let added = tree.insert(key).unwrap();
                    prop_assert_eq!(added, model.insert(key));
                }
                Op::Delete(key) => {
                    let result = tree.delete(&key);
                    if model.remove(&key) {
                        prop_assert!(result.is_ok(), "delete {} failed: {:?}", key, result);
                    } else {
                        prop_assert!(result.map_err(|e| e.is_not_found()) == Err(true));
                    }
                }
                Op::Exists(key) => {
                    prop_assert_eq!(tree.exists(&key).unwrap(), model.contains(&key));
                }
            }
        }

        let stats = tree.validate().unwrap();
        prop_assert_eq!(stats.keys, model.len());
        prop_assert_eq!(stats.nodes, tree.store().len());
        prop_assert!(tree.orphaned_records().unwrap().is_empty());

        for key in key_strategy_range() {
            prop_assert_eq!(tree.exists(&key).unwrap(), model.contains(&key));
        }
    }

    #[test]
    fn prop_invariants_hold_after_every_op(t in 2usize..4, ops in prop::collection::vec(
        prop_oneof![
            3 => (0u16..60).prop_map(Op::Insert),
            2 => (0u16..60).prop_map(Op::Delete),
        ],
        0..=300,
    )) {
        let mut tree: BTree<u16> = BTree::in_memory(t).unwrap();
        let mut model: BTreeSet<u16> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(key) => {
                    tree.insert(key).unwrap();
                    model.insert(key);
                }
                Op::Delete(key) => {
                    let _ = tree.delete(&key);
                    model.remove(&key);
                }
                Op::Exists(_) => {}
            }

            let stats = tree.validate().unwrap();
            prop_assert_eq!(stats.keys, model.len());
            if model.is_empty() {
                prop_assert_eq!(stats.height, 1);
            }
        }
    }
}

fn key_strategy_range() -> std::ops::Range<u16> {
    0..300
}
