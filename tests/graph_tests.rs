//! Graph builder invariant tests
//!
//! The dual edge index (inputs table + user lists) must stay consistent
//! under any sequence of builder operations. Directed cases cover the
//! rewrite primitives; the property tests drive random operation
//! sequences through the builder and re-check the invariants after every
//! step.

use proptest::prelude::*;
use weft::ir::{GraphIr, PortRef};
use weft_isa::{OpKind, MAX_PORTS};

fn port(node: u32, p: usize) -> PortRef {
    PortRef::new(node, p)
}

#[test]
fn test_replace_then_remove_keeps_invariants() {
    let mut ir = GraphIr::new();
    let a = ir.add("a", OpKind::Input);
    let b = ir.add("b", OpKind::Mul);
    let c = ir.add("c", OpKind::Add);
    let o = ir.add("o", OpKind::Output);
    ir.connect(port(a, 0), port(b, 0));
    ir.connect(port(b, 0), port(c, 0));
    ir.connect(port(c, 0), port(o, 0));

    // Splice b out the way rewrites do: repoint users, then tombstone.
    ir.replace(b, a);
    ir.remove(b);

    ir.check_invariants().unwrap();
    assert_eq!(ir.input_source(c, 0), Some(a));
    assert!(ir.node(b).is_tombstone());
}

#[test]
fn test_tombstones_have_no_connectivity() {
    let mut ir = GraphIr::new();
    let a = ir.add("a", OpKind::Input);
    let b = ir.add("b", OpKind::Neg);
    ir.connect(port(a, 0), port(b, 0));
    ir.remove(b);

    assert!(ir.node(b).users().is_empty());
    for p in 0..MAX_PORTS {
        assert!(ir.node(b).input(p).is_none());
    }
    ir.check_invariants().unwrap();
}

/// One random builder operation.
#[derive(Debug, Clone)]
enum Op {
    Connect { src: u8, dst: u8, port: u8 },
    Disconnect { dst: u8, port: u8 },
    RemoveIfUnused { node: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), any::<u8>(), 0..MAX_PORTS as u8)
            .prop_map(|(src, dst, port)| Op::Connect { src, dst, port }),
        (any::<u8>(), 0..MAX_PORTS as u8).prop_map(|(dst, port)| Op::Disconnect { dst, port }),
        any::<u8>().prop_map(|node| Op::RemoveIfUnused { node }),
    ]
}

proptest! {
    #[test]
    fn prop_random_operations_preserve_invariants(
        node_count in 2usize..12,
        ops in proptest::collection::vec(op_strategy(), 1..64),
    ) {
        let mut ir = GraphIr::new();
        for i in 0..node_count {
            ir.add(format!("n{i}"), OpKind::Add);
        }
        let n = node_count as u32;

        for op in ops {
            match op {
                Op::Connect { src, dst, port } => {
                    let src = u32::from(src) % n;
                    let dst = u32::from(dst) % n;
                    if src == dst {
                        continue; // self-loops are the sort pass's problem
                    }
                    if ir.node(src).is_tombstone() || ir.node(dst).is_tombstone() {
                        continue;
                    }
                    ir.connect(PortRef::new(src, 0), port_ref(dst, port));
                }
                Op::Disconnect { dst, port } => {
                    let dst = u32::from(dst) % n;
                    if !ir.node(dst).is_tombstone() {
                        ir.disconnect(port_ref(dst, port));
                    }
                }
                Op::RemoveIfUnused { node } => {
                    let node = u32::from(node) % n;
                    if ir.user_count(node) == 0 {
                        ir.remove(node);
                    }
                }
            }
            prop_assert!(ir.check_invariants().is_ok());
        }
    }

    #[test]
    fn prop_connect_disconnect_roundtrip(src in 0u32..4, dst in 4u32..8, p in 0usize..MAX_PORTS) {
        let mut ir = GraphIr::new();
        for i in 0..8 {
            ir.add(format!("n{i}"), OpKind::Mul);
        }
        ir.connect(PortRef::new(src, 0), PortRef::new(dst, p));
        prop_assert_eq!(ir.input_source(dst, p), Some(src));
        ir.disconnect(PortRef::new(dst, p));
        prop_assert_eq!(ir.input_source(dst, p), None);
        prop_assert!(ir.node(src).users().is_empty());
        prop_assert!(ir.check_invariants().is_ok());
    }
}

fn port_ref(node: u32, port: u8) -> PortRef {
    PortRef::new(node, usize::from(port) % MAX_PORTS)
}
