//! Compiler-wide rewrite tables.
//!
//! Read-only configuration consumed by the lowering, decompose and fuse
//! passes. Everything here is plain static data so rule changes never
//! touch pass logic.

use weft_isa::OpKind;

/// One producer pattern inside a fusion rule.
#[derive(Debug, Clone, Copy)]
pub struct FusionMatch {
    /// Port of the target node whose producer is matched.
    pub port_name: &'static str,
    /// Required kind of that producer.
    pub match_kind: OpKind,
    /// The producer may have at most this many users, or fusing it away
    /// would recompute work for other consumers.
    pub max_users: usize,
    /// Port on the replacement node where the producer's own inputs land,
    /// consecutively.
    pub remap_to_port: &'static str,
}

/// Collapse a node and one or two of its producers into a single opcode.
#[derive(Debug, Clone, Copy)]
pub struct FusionRule {
    pub target_kind: OpKind,
    pub replace_with: OpKind,
    pub matches: &'static [FusionMatch],
}

/// MUL feeding either ADD port fuses into FMA when the product has no
/// other consumer.
pub static FUSION_RULES: &[FusionRule] = &[
    FusionRule {
        target_kind: OpKind::Add,
        replace_with: OpKind::Fma,
        matches: &[FusionMatch {
            port_name: "a",
            match_kind: OpKind::Mul,
            max_users: 1,
            remap_to_port: "a",
        }],
    },
    FusionRule {
        target_kind: OpKind::Add,
        replace_with: OpKind::Fma,
        matches: &[FusionMatch {
            port_name: "b",
            match_kind: OpKind::Mul,
            max_users: 1,
            remap_to_port: "a",
        }],
    },
];

/// One node materialised by a lowering rule.
#[derive(Debug, Clone, Copy)]
pub struct LoweringStep {
    /// Local id; the new node is named `"<original.id>.<id>"`.
    pub id: &'static str,
    pub kind: OpKind,
    /// Per-port input: a step id, a port name of the original op, or
    /// `None` for unconnected.
    pub input_map: [Option<&'static str>; 4],
}

/// Rewrite a composite op into an atomic subgraph.
#[derive(Debug, Clone, Copy)]
pub struct LoweringRule {
    pub target_kind: OpKind,
    pub steps: &'static [LoweringStep],
    /// Step whose node takes over the original's consumers.
    pub output_node_id: &'static str,
}

pub static LOWERING_RULES: &[LoweringRule] = &[
    // magnitude(v) = sqrt(dot(v, v))
    LoweringRule {
        target_kind: OpKind::Magnitude,
        steps: &[
            LoweringStep {
                id: "dot",
                kind: OpKind::Dot,
                input_map: [Some("in"), Some("in"), None, None],
            },
            LoweringStep {
                id: "root",
                kind: OpKind::Sqrt,
                input_map: [Some("dot"), None, None, None],
            },
        ],
        output_node_id: "root",
    },
    // normalize(v) = v / magnitude(v), expanded to atomics directly since
    // decompose does not revisit nodes it introduces.
    LoweringRule {
        target_kind: OpKind::Normalize,
        steps: &[
            LoweringStep {
                id: "dot",
                kind: OpKind::Dot,
                input_map: [Some("in"), Some("in"), None, None],
            },
            LoweringStep {
                id: "root",
                kind: OpKind::Sqrt,
                input_map: [Some("dot"), None, None, None],
            },
            LoweringStep {
                id: "norm",
                kind: OpKind::Div,
                input_map: [Some("in"), Some("root"), None, None],
            },
        ],
        output_node_id: "norm",
    },
    // lerp(a, b, t) = a + (b - a) * t
    LoweringRule {
        target_kind: OpKind::Lerp,
        steps: &[
            LoweringStep {
                id: "span",
                kind: OpKind::Sub,
                input_map: [Some("b"), Some("a"), None, None],
            },
            LoweringStep {
                id: "scaled",
                kind: OpKind::Mul,
                input_map: [Some("span"), Some("t"), None, None],
            },
            LoweringStep {
                id: "mix",
                kind: OpKind::Add,
                input_map: [Some("a"), Some("scaled"), None, None],
            },
        ],
        output_node_id: "mix",
    },
];

/// Surface-syntax synonyms accepted by the lowering pass.
pub static TYPE_ALIASES: &[(&str, OpKind)] = &[
    ("plus", OpKind::Add),
    ("minus", OpKind::Sub),
    ("times", OpKind::Mul),
    ("divide", OpKind::Div),
    ("mad", OpKind::Fma),
    ("index", OpKind::IndexX),
    ("mag", OpKind::Magnitude),
    ("len", OpKind::Magnitude),
    ("mix", OpKind::Lerp),
];
