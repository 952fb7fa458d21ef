//! # Graph IR
//!
//! The mutable intermediate representation every pass operates on, plus
//! the builder API that is the only legal way to mutate connectivity.
//!
//! Edges are stored redundantly for O(1) traversal in both directions:
//!
//! - each node holds an `inputs` table indexed by destination port, and
//! - each node holds the list of `users` reading its output.
//!
//! Every builder operation keeps the two views consistent: if
//! `inputs[p]` of node N names producer P, then P's user list contains
//! exactly one `(N, p)` entry, and vice versa.
//!
//! Nodes are never deleted. `remove` tombstones them (`kind = Unknown`,
//! connectivity cleared) so that node indices stay stable identifiers
//! for the whole compilation.

use std::path::PathBuf;

use weft_ast::{AppSettings, SourceLoc};
use weft_isa::{OpKind, TypeInfo, MAX_PORTS, REG_NONE};

/// Index of a node in the graph's node array.
pub type NodeIdx = u32;

/// One endpoint: a node and a port on it. Output ports are always 0 in
/// the current ISA; the field exists so rewires preserve the source port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRef {
    pub node: NodeIdx,
    pub port: u8,
}

impl PortRef {
    pub fn new(node: NodeIdx, port: usize) -> PortRef {
        PortRef {
            node,
            port: port as u8,
        }
    }
}

/// One vertex of the graph.
#[derive(Debug, Clone)]
pub struct IrNode {
    pub id: String,
    pub kind: OpKind,

    /// Declared tensor info (shape/dtype attributes, constant payload).
    pub const_info: TypeInfo,
    /// Constant payload bytes, little-endian elements.
    pub const_data: Option<Vec<u8>>,

    /// Referenced subgraph file, for `Call` nodes.
    pub sub_graph_path: Option<PathBuf>,

    pub loc: SourceLoc,

    // Connectivity. Private: all mutation goes through the builder API.
    inputs: [Option<PortRef>; MAX_PORTS],
    users: Vec<PortRef>,

    // Analysis outputs.
    pub out_info: TypeInfo,
    pub out_reg: u16,
    pub domain: Option<NodeIdx>,
    pub is_spatial: bool,
    /// `weft_isa::RESOURCE_FLAG_*` bits.
    pub resource_flags: u8,
}

impl IrNode {
    fn new(id: String, kind: OpKind) -> IrNode {
        IrNode {
            id,
            kind,
            const_info: TypeInfo::default(),
            const_data: None,
            sub_graph_path: None,
            loc: SourceLoc::default(),
            inputs: [None; MAX_PORTS],
            users: Vec::new(),
            out_info: TypeInfo::default(),
            out_reg: REG_NONE,
            domain: None,
            is_spatial: false,
            resource_flags: 0,
        }
    }

    /// Tombstoned nodes are skipped by every pass.
    pub fn is_tombstone(&self) -> bool {
        self.kind == OpKind::Unknown
    }

    /// Read-only view of the input table.
    pub fn input(&self, port: usize) -> Option<PortRef> {
        self.inputs.get(port).copied().flatten()
    }

    /// Read-only view of the user list.
    pub fn users(&self) -> &[PortRef] {
        &self.users
    }
}

/// The graph plus the application settings destined for the cartridge
/// header.
#[derive(Debug, Clone, Default)]
pub struct GraphIr {
    nodes: Vec<IrNode>,
    pub settings: AppSettings,
}

impl GraphIr {
    pub fn new() -> GraphIr {
        GraphIr::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &IrNode {
        &self.nodes[idx as usize]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut IrNode {
        &mut self.nodes[idx as usize]
    }

    /// Indices of all non-tombstoned nodes, in creation order.
    pub fn live_indices(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_tombstone())
            .map(|(i, _)| i as NodeIdx)
    }

    /// Append a fresh node with cleared connectivity.
    pub fn add(&mut self, id: impl Into<String>, kind: OpKind) -> NodeIdx {
        self.nodes.push(IrNode::new(id.into(), kind));
        (self.nodes.len() - 1) as NodeIdx
    }

    /// Connect `src`'s output to the destination port, unlinking any
    /// previous producer of that port first.
    pub fn connect(&mut self, src: PortRef, dst: PortRef) {
        self.disconnect(dst);
        self.nodes[dst.node as usize].inputs[dst.port as usize] = Some(src);
        self.nodes[src.node as usize].users.push(dst);
    }

    /// Clear the destination port and remove the matching user entry from
    /// its former producer.
    pub fn disconnect(&mut self, dst: PortRef) {
        let prev = self.nodes[dst.node as usize].inputs[dst.port as usize].take();
        if let Some(src) = prev {
            let users = &mut self.nodes[src.node as usize].users;
            if let Some(pos) = users.iter().position(|u| *u == dst) {
                users.swap_remove(pos);
            }
        }
    }

    /// Producer of a destination port, if connected.
    pub fn source(&self, dst: PortRef) -> Option<PortRef> {
        self.nodes[dst.node as usize].inputs[dst.port as usize]
    }

    /// Producer *node* of `node`'s input `port`.
    pub fn input_source(&self, node: NodeIdx, port: usize) -> Option<NodeIdx> {
        self.source(PortRef::new(node, port)).map(|p| p.node)
    }

    /// Rewire every user of `old` to read from `new` instead. `old` keeps
    /// its own inputs; `new` inherits the spliced user list.
    pub fn replace(&mut self, old: NodeIdx, new: NodeIdx) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.nodes[old as usize].users);
        for user in &users {
            let slot = &mut self.nodes[user.node as usize].inputs[user.port as usize];
            let port = slot.map(|p| p.port).unwrap_or(0);
            *slot = Some(PortRef { node: new, port });
        }
        self.nodes[new as usize].users.extend(users);
    }

    /// Disconnect all inputs, then tombstone. The node's slot stays
    /// allocated so existing indices remain valid.
    pub fn remove(&mut self, idx: NodeIdx) {
        for p in 0..MAX_PORTS {
            self.disconnect(PortRef::new(idx, p));
        }
        let node = &mut self.nodes[idx as usize];
        node.kind = OpKind::Unknown;
        node.users.clear();
    }

    /// Number of live consumers of a node's output.
    pub fn user_count(&self, idx: NodeIdx) -> usize {
        self.nodes[idx as usize].users.len()
    }

    /// First live node with the given id.
    pub fn find_by_id(&self, id: &str) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .position(|n| !n.is_tombstone() && n.id == id)
            .map(|i| i as NodeIdx)
    }

    /// First live node holding the given register.
    pub fn find_by_reg(&self, reg: u16) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .position(|n| !n.is_tombstone() && n.out_reg == reg)
            .map(|i| i as NodeIdx)
    }

    /// Copy every live node of `sub` into this graph, ids prefixed with
    /// `"<prefix>::"`, edges translated through the returned index map
    /// (`None` for tombstoned source slots).
    pub fn graft(&mut self, sub: &GraphIr, prefix: &str) -> Vec<Option<NodeIdx>> {
        let mut map: Vec<Option<NodeIdx>> = vec![None; sub.len()];
        for (i, src) in sub.nodes.iter().enumerate() {
            if src.is_tombstone() {
                continue;
            }
            let idx = self.add(format!("{prefix}::{}", src.id), src.kind);
            let node = self.node_mut(idx);
            node.loc = src.loc.clone();
            node.const_info = src.const_info;
            node.const_data = src.const_data.clone();
            node.sub_graph_path = src.sub_graph_path.clone();
            node.out_info = src.out_info;
            node.resource_flags = src.resource_flags;
            map[i] = Some(idx);
        }
        for (i, src) in sub.nodes.iter().enumerate() {
            if src.is_tombstone() {
                continue;
            }
            for p in 0..MAX_PORTS {
                if let Some(s) = src.input(p) {
                    if let (Some(new_src), Some(new_dst)) = (map[s.node as usize], map[i]) {
                        self.connect(
                            PortRef {
                                node: new_src,
                                port: s.port,
                            },
                            PortRef::new(new_dst, p),
                        );
                    }
                }
            }
        }
        map
    }

    /// Verify the dual-index invariants. Debugging aid used by the test
    /// suites; not called on the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_tombstone() {
                if !node.users.is_empty() {
                    return Err(format!("tombstone {i} has users"));
                }
                if node.inputs.iter().any(|p| p.is_some()) {
                    return Err(format!("tombstone {i} has inputs"));
                }
                continue;
            }
            for (p, src) in node.inputs.iter().enumerate() {
                if let Some(src) = src {
                    let entry = PortRef::new(i as NodeIdx, p);
                    let count = self.nodes[src.node as usize]
                        .users
                        .iter()
                        .filter(|u| **u == entry)
                        .count();
                    if count != 1 {
                        return Err(format!(
                            "node {i} port {p}: producer {} has {count} matching user entries",
                            src.node
                        ));
                    }
                }
            }
            for user in &node.users {
                let back = self.nodes[user.node as usize].inputs[user.port as usize];
                if back.map(|b| b.node) != Some(i as NodeIdx) {
                    return Err(format!(
                        "node {i}: stale user entry ({}, {})",
                        user.node, user.port
                    ));
                }
            }
        }
        Ok(())
    }
}
