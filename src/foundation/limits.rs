//! Fixed engine capacities. Programs that need more are rejected before execution.

/// Values in the per-invocation stack (parameters, locals and operands of every frame).
pub const STACK_CAPACITY: usize = 192;

/// Global slots available to one invocation.
pub const GLOBAL_CAPACITY: usize = 32;

/// Entries per predicate stack, including the base entry.
pub const PREDICATE_CAPACITY: usize = 16;

/// Nested calls below the entry function.
pub const MAX_CALL_DEPTH: usize = 64;
