//! # Weft ISA
//!
//! The instruction set architecture shared between the Weft compiler and
//! the runtime executor: tensor types and shape math, the opcode set with
//! its static per-op metadata, and the bytecode data model (`Program`,
//! `Instruction`, `Task`, `Binding`, ...) that a compiled cartridge
//! section deserialises into.
//!
//! This crate is deliberately dependency-free so that both sides of the
//! toolchain can share it without dragging the compiler's stack into the
//! runtime.

pub mod metadata;
pub mod opcodes;
pub mod program;
pub mod types;

pub use metadata::{op_from_name, op_meta, port_index, port_name};
pub use opcodes::{
    DispatchStrategy, DtypeRule, OpAssertion, OpCategory, OpKind, OpMetadata, ShapeRule,
    OP_FLAG_FORCE_DOM, OP_FLAG_GENERATOR,
};
pub use program::{
    Binding, Grid, Instruction, Program, Symbol, Task, TensorDesc, MAX_REGISTERS, REG_NONE,
};
pub use types::{Dtype, TypeInfo, MAX_DIMS};

/// Maximum number of input ports on any operation.
pub const MAX_PORTS: usize = 4;
