//! Opcode set and the static metadata record attached to every operation.

/// Every operation kind the compiler understands. `Unknown` doubles as the
/// tombstone value for removed IR nodes, so discriminant 0 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OpKind {
    Unknown = 0,

    // Sources, sinks and structural nodes.
    Input,
    Output,
    Const,
    Call,

    // Elementwise arithmetic.
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Pow,
    Fma,
    Select,
    Clamp,
    Neg,
    Abs,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Floor,
    ToF32,
    ToI32,
    ToU8,

    // Generators: one value per domain element.
    IndexX,
    IndexY,
    IndexZ,
    Time,

    // Reductions.
    Sum,
    Mean,
    ReduceMin,
    ReduceMax,

    // Accelerated kernels.
    MatMul,
    Dot,
    Softmax,

    // Memory layout operations; Reshape and Slice are zero-copy bridges.
    Transpose,
    Join,
    Gather,
    Reshape,
    Slice,

    // Composites, rewritten into atomic subgraphs by the decompose pass.
    Magnitude,
    Normalize,
    Lerp,
}

/// Number of opcodes, including `Unknown`.
pub const OP_COUNT: usize = OpKind::ALL.len();

impl OpKind {
    /// Every opcode in discriminant order. The metadata table is indexed
    /// by this order.
    pub const ALL: &'static [OpKind] = &[
        OpKind::Unknown,
        OpKind::Input,
        OpKind::Output,
        OpKind::Const,
        OpKind::Call,
        OpKind::Add,
        OpKind::Sub,
        OpKind::Mul,
        OpKind::Div,
        OpKind::Min,
        OpKind::Max,
        OpKind::Pow,
        OpKind::Fma,
        OpKind::Select,
        OpKind::Clamp,
        OpKind::Neg,
        OpKind::Abs,
        OpKind::Sqrt,
        OpKind::Exp,
        OpKind::Log,
        OpKind::Sin,
        OpKind::Cos,
        OpKind::Floor,
        OpKind::ToF32,
        OpKind::ToI32,
        OpKind::ToU8,
        OpKind::IndexX,
        OpKind::IndexY,
        OpKind::IndexZ,
        OpKind::Time,
        OpKind::Sum,
        OpKind::Mean,
        OpKind::ReduceMin,
        OpKind::ReduceMax,
        OpKind::MatMul,
        OpKind::Dot,
        OpKind::Softmax,
        OpKind::Transpose,
        OpKind::Join,
        OpKind::Gather,
        OpKind::Reshape,
        OpKind::Slice,
        OpKind::Magnitude,
        OpKind::Normalize,
        OpKind::Lerp,
    ];

    /// True for the zero-copy view bridges.
    pub fn is_bridge(self) -> bool {
        matches!(self, OpKind::Reshape | OpKind::Slice)
    }
}

/// Broad execution class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCategory {
    /// Elementwise compute over the domain.
    Atomic,
    /// Accumulating reduction to a scalar.
    Reduction,
    /// Data movement / layout.
    Memory,
    /// Specialised kernels (matmul, softmax, ...).
    Accel,
    /// Structural nodes that never emit instructions.
    Special,
}

/// How the runtime dispatches the task containing an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchStrategy {
    /// One invocation per domain element.
    Default = 0,
    /// Accumulate into reduction scratch.
    Reduction = 1,
    /// Two dispatches with a sync point in between.
    TwoPassSync = 2,
}

/// Output dtype resolution rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeRule {
    /// No rule; analysis falls back to `F32` unless seeded.
    Unspecified,
    ForceF32,
    ForceU8,
    ForceI32,
    /// Copy the dtype of input 0.
    SameAsInput,
    /// Copy the dtype of input 1.
    SameAsInput2,
}

/// Output shape resolution rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRule {
    SameAsS1,
    SameAsS2,
    Broadcast,
    MatMul,
    Transpose,
    Dot,
    Join,
    Gather,
    Reshape,
    Slice,
    Scalar,
    /// Handled per-kind (Input/Output/Const/Call).
    Special,
}

/// The op produces one value per domain element.
pub const OP_FLAG_GENERATOR: u8 = 1 << 0;
/// Generator inflation does not apply; the output keeps its own shape.
pub const OP_FLAG_FORCE_DOM: u8 = 1 << 1;

/// Declarative validation assertion attached to an opcode.
#[derive(Debug, Clone, Copy)]
pub enum OpAssertion {
    /// `input[p0].shape[a0] == input[p1].shape[a1]`, negative axes counted
    /// from the back. Fails with `msg`.
    MatchDim {
        p0: usize,
        a0: i32,
        p1: usize,
        a1: i32,
        msg: &'static str,
    },
    /// Inputs 0 and 1 must be broadcast-compatible.
    BroadcastCompatible,
}

/// Static description of one opcode. One record per `OpKind`, stored in
/// the compiler-wide metadata table.
#[derive(Debug, Clone, Copy)]
pub struct OpMetadata {
    /// Surface name as written in manifests.
    pub name: &'static str,
    pub category: OpCategory,
    pub strategy: DispatchStrategy,
    /// Accepted input dtypes, one bit per `Dtype`.
    pub input_mask: u8,
    pub out_rule: DtypeRule,
    pub shape_rule: ShapeRule,
    /// Input port names; `None` past the last port.
    pub ports: [Option<&'static str>; 4],
    /// Number of *required* ports; ports beyond it are optional.
    pub arity: u8,
    /// Minimum rank of input 0; 0 = unbounded.
    pub min_rank: u8,
    /// Maximum rank of input 0; 0 = unbounded.
    pub max_rank: u8,
    /// `OP_FLAG_*` bits.
    pub flags: u8,
    pub assertions: &'static [OpAssertion],
}
