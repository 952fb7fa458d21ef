//! The compiler-wide operation metadata table.
//!
//! One immutable record per opcode: surface name, category, dispatch
//! strategy, dtype mask and rules, port names, arity, rank bounds and
//! declarative assertions. The table is indexed by `OpKind` discriminant
//! and must stay in `OpKind::ALL` order; `tests` below pin that down.

use crate::opcodes::{
    DispatchStrategy, DtypeRule, OpAssertion, OpCategory, OpKind, OpMetadata, ShapeRule, OP_COUNT,
    OP_FLAG_FORCE_DOM, OP_FLAG_GENERATOR,
};
use crate::types::{MASK_ANY, MASK_F32};

const NO_PORTS: [Option<&str>; 4] = [None, None, None, None];
const P1: [Option<&str>; 4] = [Some("in"), None, None, None];
const P2: [Option<&str>; 4] = [Some("a"), Some("b"), None, None];
const P3: [Option<&str>; 4] = [Some("a"), Some("b"), Some("c"), None];

/// Template most records start from; fields are overridden per entry.
const BASE: OpMetadata = OpMetadata {
    name: "unknown",
    category: OpCategory::Special,
    strategy: DispatchStrategy::Default,
    input_mask: MASK_ANY,
    out_rule: DtypeRule::Unspecified,
    shape_rule: ShapeRule::Special,
    ports: NO_PORTS,
    arity: 0,
    min_rank: 0,
    max_rank: 0,
    flags: 0,
    assertions: &[],
};

const BINARY_EW: OpMetadata = OpMetadata {
    category: OpCategory::Atomic,
    out_rule: DtypeRule::SameAsInput,
    shape_rule: ShapeRule::Broadcast,
    ports: P2,
    arity: 2,
    assertions: &[OpAssertion::BroadcastCompatible],
    ..BASE
};

const UNARY_EW: OpMetadata = OpMetadata {
    category: OpCategory::Atomic,
    out_rule: DtypeRule::SameAsInput,
    shape_rule: ShapeRule::SameAsS1,
    ports: P1,
    arity: 1,
    ..BASE
};

const UNARY_F32: OpMetadata = OpMetadata {
    input_mask: MASK_F32,
    ..UNARY_EW
};

const GENERATOR: OpMetadata = OpMetadata {
    category: OpCategory::Atomic,
    out_rule: DtypeRule::ForceF32,
    shape_rule: ShapeRule::Scalar,
    flags: OP_FLAG_GENERATOR,
    ..BASE
};

const REDUCE: OpMetadata = OpMetadata {
    category: OpCategory::Reduction,
    strategy: DispatchStrategy::Reduction,
    out_rule: DtypeRule::SameAsInput,
    shape_rule: ShapeRule::Scalar,
    ports: P1,
    arity: 1,
    ..BASE
};

static TABLE: [OpMetadata; OP_COUNT] = [
    // Unknown
    BASE,
    // Input: port "in" is optional wiring for pass-through aliasing.
    OpMetadata {
        name: "input",
        ports: P1,
        ..BASE
    },
    OpMetadata {
        name: "output",
        out_rule: DtypeRule::SameAsInput,
        ports: P1,
        arity: 1,
        ..BASE
    },
    OpMetadata {
        name: "const",
        ..BASE
    },
    // Call ports are positional; subgraph inputs bind by order.
    OpMetadata {
        name: "call",
        ports: [Some("in"), Some("b"), Some("c"), Some("d")],
        ..BASE
    },
    OpMetadata { name: "add", ..BINARY_EW },
    OpMetadata { name: "sub", ..BINARY_EW },
    OpMetadata { name: "mul", ..BINARY_EW },
    OpMetadata { name: "div", ..BINARY_EW },
    OpMetadata { name: "min", ..BINARY_EW },
    OpMetadata { name: "max", ..BINARY_EW },
    OpMetadata {
        name: "pow",
        input_mask: MASK_F32,
        ..BINARY_EW
    },
    OpMetadata {
        name: "fma",
        ports: P3,
        arity: 3,
        ..BINARY_EW
    },
    OpMetadata {
        name: "select",
        out_rule: DtypeRule::SameAsInput2,
        ports: [Some("cond"), Some("a"), Some("b"), None],
        arity: 3,
        ..BINARY_EW
    },
    OpMetadata {
        name: "clamp",
        ports: [Some("in"), Some("lo"), Some("hi"), None],
        arity: 3,
        ..BINARY_EW
    },
    OpMetadata { name: "neg", ..UNARY_EW },
    OpMetadata { name: "abs", ..UNARY_EW },
    OpMetadata { name: "sqrt", ..UNARY_F32 },
    OpMetadata { name: "exp", ..UNARY_F32 },
    OpMetadata { name: "log", ..UNARY_F32 },
    OpMetadata { name: "sin", ..UNARY_F32 },
    OpMetadata { name: "cos", ..UNARY_F32 },
    OpMetadata { name: "floor", ..UNARY_F32 },
    OpMetadata {
        name: "to_f32",
        out_rule: DtypeRule::ForceF32,
        ..UNARY_EW
    },
    OpMetadata {
        name: "to_i32",
        out_rule: DtypeRule::ForceI32,
        ..UNARY_EW
    },
    OpMetadata {
        name: "to_u8",
        out_rule: DtypeRule::ForceU8,
        ..UNARY_EW
    },
    OpMetadata { name: "index_x", ..GENERATOR },
    OpMetadata { name: "index_y", ..GENERATOR },
    OpMetadata { name: "index_z", ..GENERATOR },
    // Uniform per dispatch: never inflated to the domain shape.
    OpMetadata {
        name: "time",
        flags: OP_FLAG_GENERATOR | OP_FLAG_FORCE_DOM,
        ..GENERATOR
    },
    OpMetadata { name: "sum", ..REDUCE },
    OpMetadata {
        name: "mean",
        out_rule: DtypeRule::ForceF32,
        ..REDUCE
    },
    OpMetadata { name: "reduce_min", ..REDUCE },
    OpMetadata { name: "reduce_max", ..REDUCE },
    OpMetadata {
        name: "matmul",
        category: OpCategory::Accel,
        input_mask: MASK_F32,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::MatMul,
        ports: P2,
        arity: 2,
        min_rank: 2,
        assertions: &[OpAssertion::MatchDim {
            p0: 0,
            a0: -1,
            p1: 1,
            a1: -2,
            msg: "MatMul inner dimensions mismatch",
        }],
        ..BASE
    },
    OpMetadata {
        name: "dot",
        category: OpCategory::Accel,
        input_mask: MASK_F32,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::Dot,
        ports: P2,
        arity: 2,
        min_rank: 1,
        assertions: &[OpAssertion::MatchDim {
            p0: 0,
            a0: -1,
            p1: 1,
            a1: -1,
            msg: "Dot last dimensions mismatch",
        }],
        ..BASE
    },
    OpMetadata {
        name: "softmax",
        category: OpCategory::Accel,
        strategy: DispatchStrategy::TwoPassSync,
        input_mask: MASK_F32,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::SameAsS1,
        ports: P1,
        arity: 1,
        min_rank: 1,
        ..BASE
    },
    OpMetadata {
        name: "transpose",
        category: OpCategory::Memory,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::Transpose,
        ports: P1,
        arity: 1,
        min_rank: 2,
        ..BASE
    },
    OpMetadata {
        name: "join",
        category: OpCategory::Memory,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::Join,
        ports: [Some("a"), Some("b"), Some("c"), Some("d")],
        arity: 2,
        ..BASE
    },
    OpMetadata {
        name: "gather",
        category: OpCategory::Memory,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::Gather,
        ports: [Some("src"), Some("ids"), None, None],
        arity: 2,
        ..BASE
    },
    // The shape port is optional: without a constant shape the node
    // inherits its input shape and is a pure alias.
    OpMetadata {
        name: "reshape",
        category: OpCategory::Memory,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::Reshape,
        ports: [Some("in"), Some("shape"), None, None],
        arity: 1,
        ..BASE
    },
    OpMetadata {
        name: "slice",
        category: OpCategory::Memory,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::Slice,
        ports: [Some("in"), Some("range"), None, None],
        arity: 2,
        ..BASE
    },
    OpMetadata {
        name: "magnitude",
        category: OpCategory::Atomic,
        input_mask: MASK_F32,
        out_rule: DtypeRule::ForceF32,
        shape_rule: ShapeRule::Dot,
        ports: P1,
        arity: 1,
        ..BASE
    },
    OpMetadata {
        name: "normalize",
        category: OpCategory::Atomic,
        input_mask: MASK_F32,
        out_rule: DtypeRule::SameAsInput,
        shape_rule: ShapeRule::SameAsS1,
        ports: P1,
        arity: 1,
        ..BASE
    },
    OpMetadata {
        name: "lerp",
        input_mask: MASK_F32,
        ports: [Some("a"), Some("b"), Some("t"), None],
        arity: 3,
        ..BINARY_EW
    },
];

/// Metadata record for an opcode.
pub fn op_meta(kind: OpKind) -> &'static OpMetadata {
    &TABLE[kind as usize]
}

/// Resolve a surface type name to an opcode. Aliases are resolved by the
/// compiler's alias table, not here.
pub fn op_from_name(name: &str) -> Option<OpKind> {
    OpKind::ALL
        .iter()
        .skip(1) // "unknown" is not a surface type
        .copied()
        .find(|&k| op_meta(k).name == name)
}

/// Index of a named port on an opcode, if present.
pub fn port_index(kind: OpKind, port: &str) -> Option<usize> {
    op_meta(kind)
        .ports
        .iter()
        .position(|p| *p == Some(port))
}

/// Name of the port at `idx` on an opcode, if present.
pub fn port_name(kind: OpKind, idx: usize) -> Option<&'static str> {
    op_meta(kind).ports.get(idx).copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_opkind_order() {
        // Every name must round-trip through the lookup; a mismatch means
        // the table drifted out of discriminant order.
        for &kind in OpKind::ALL.iter().skip(1) {
            assert_eq!(
                op_from_name(op_meta(kind).name),
                Some(kind),
                "metadata row out of order for {:?}",
                kind
            );
        }
        assert_eq!(op_meta(OpKind::Unknown).name, "unknown");
    }

    #[test]
    fn test_port_lookup() {
        assert_eq!(port_index(OpKind::Add, "a"), Some(0));
        assert_eq!(port_index(OpKind::Add, "b"), Some(1));
        assert_eq!(port_index(OpKind::Add, "c"), None);
        assert_eq!(port_name(OpKind::Gather, 1), Some("ids"));
        assert_eq!(port_index(OpKind::Select, "cond"), Some(0));
    }

    #[test]
    fn test_strategies() {
        assert_eq!(op_meta(OpKind::Sum).strategy, DispatchStrategy::Reduction);
        assert_eq!(
            op_meta(OpKind::Softmax).strategy,
            DispatchStrategy::TwoPassSync
        );
        assert_eq!(op_meta(OpKind::Add).strategy, DispatchStrategy::Default);
    }

    #[test]
    fn test_generator_flags() {
        assert_ne!(op_meta(OpKind::IndexX).flags & OP_FLAG_GENERATOR, 0);
        assert_ne!(op_meta(OpKind::Time).flags & OP_FLAG_FORCE_DOM, 0);
        assert_eq!(op_meta(OpKind::IndexY).flags & OP_FLAG_FORCE_DOM, 0);
    }
}
