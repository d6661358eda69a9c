//! shadevm is a lane-parallel interpreter for compiled shading-language bytecode.
//!
//! A [`Program`] is an immutable set of functions plus slot counts. The engine runs one
//! function over many independent elements at once: each element occupies one lane of a
//! [`VEC_WIDTH`]-wide register file, and divergent control flow is expressed with per-lane
//! predicate masks instead of branches.
//!
//! # Execution overview
//!
//! 1. **Build**: a compiler (or the [`Assembler`]) emits each function's instruction stream.
//! 2. **Verify**: [`Program::validate`] checks operands, slot bounds and capacities.
//! 3. **Run**: [`Program::run`] for one element, [`Program::run_striped`] for many.
//!
//! Design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **No panics across the boundary**: malformed bytecode and bad shapes are [`VmError`]s.
//! - **Shared programs**: a `Program` can be run from many threads; every invocation owns
//!   its stack, globals and masks.
//! - **Per-lane host calls**: [`ExternalValue`] callbacks see one element at a time.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod bytecode;
mod engine;
mod foundation;
mod program;

pub use bytecode::assembler::{Assembler, Label};
pub use bytecode::opcode::Opcode;
pub use foundation::error::{VmError, VmResult};
pub use foundation::lanes::{Mask, VEC_WIDTH, Value};
pub use foundation::limits::{GLOBAL_CAPACITY, MAX_CALL_DEPTH, PREDICATE_CAPACITY, STACK_CAPACITY};
pub use program::external::ExternalValue;
pub use program::model::{Function, FunctionHandle, Parameter, Program};
