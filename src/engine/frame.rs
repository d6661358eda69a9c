use crate::foundation::error::{VmError, VmResult};
use crate::foundation::lanes::Value;
use crate::foundation::limits::STACK_CAPACITY;

/// Caller state saved by `Call` and restored by `Return`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallFrame {
    pub(crate) function: usize,
    pub(crate) return_ip: usize,
    pub(crate) base: usize,
    pub(crate) floor: usize,
    /// Callee's parameter slots, left on the stack for the caller to unwind.
    pub(crate) parameter_count: usize,
}

/// Fixed-capacity value stack shared by every frame of one invocation.
///
/// Each frame owns `[base, base + parameters + locals)`; its operands live above `floor`.
/// Pushing past capacity or popping below the floor is an error, never a panic.
#[derive(Debug, Clone)]
pub(crate) struct Stack {
    values: [Value; STACK_CAPACITY],
    sp: usize,
    pub(crate) floor: usize,
}

impl Stack {
    pub(crate) fn new() -> Self {
        Self {
            values: [Value::ZERO; STACK_CAPACITY],
            sp: 0,
            floor: 0,
        }
    }

    pub(crate) fn sp(&self) -> usize {
        self.sp
    }

    pub(crate) fn push(&mut self, v: Value) -> VmResult<()> {
        if self.sp == STACK_CAPACITY {
            return Err(overflow(1));
        }
        self.values[self.sp] = v;
        self.sp += 1;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> VmResult<Value> {
        let at = self.top(1)?;
        self.sp = at;
        Ok(self.values[at])
    }

    /// Index of the first of the top `n` operands.
    pub(crate) fn top(&self, n: usize) -> VmResult<usize> {
        match self.sp.checked_sub(n) {
            Some(at) if at >= self.floor => Ok(at),
            _ => Err(VmError::bytecode(format!(
                "stack underflow: need {n} operands, have {}",
                self.sp.saturating_sub(self.floor)
            ))),
        }
    }

    /// Make room for `n` more values above the current top.
    pub(crate) fn ensure(&self, n: usize) -> VmResult<()> {
        if self.sp + n > STACK_CAPACITY {
            return Err(overflow(n));
        }
        Ok(())
    }

    /// Drop everything from `len` up. `len` must not exceed the current top.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.sp = self.sp.min(len);
    }

    /// Move the top to `len`, which must fit the capacity.
    pub(crate) fn set_sp(&mut self, len: usize) -> VmResult<()> {
        if len > STACK_CAPACITY {
            return Err(overflow(len - self.sp.min(len)));
        }
        self.sp = len;
        Ok(())
    }

    pub(crate) fn get(&self, i: usize) -> Value {
        self.values[i]
    }

    pub(crate) fn set(&mut self, i: usize, v: Value) {
        self.values[i] = v;
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }
}

fn overflow(n: usize) -> VmError {
    VmError::capacity(format!(
        "stack of {STACK_CAPACITY} values cannot hold {n} more"
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/engine/frame.rs"]
mod tests;
