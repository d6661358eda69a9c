//! Structured predication: four lock-step stacks of lane masks.
//!
//! - `condition`: raw predicate that entered each masked scope.
//! - `mask`: running AND of every enclosing condition.
//! - `loop`: lanes still iterating the innermost loop.
//! - `cont`: lanes parked by `continue` until the next iteration.
//!
//! Side effects are gated by [`Predicates::live`], `mask & loop` at the top.

use smallvec::SmallVec;

use crate::foundation::error::{VmError, VmResult};
use crate::foundation::lanes::Mask;
use crate::foundation::limits::PREDICATE_CAPACITY;

/// One fixed-capacity stack with a permanent base entry.
#[derive(Debug, Clone)]
pub(crate) struct PredicateStack {
    name: &'static str,
    entries: SmallVec<[Mask; PREDICATE_CAPACITY]>,
}

impl PredicateStack {
    pub(crate) fn new(name: &'static str, base: Mask) -> Self {
        let mut entries = SmallVec::new();
        entries.push(base);
        Self { name, entries }
    }

    /// Scopes opened above the base entry.
    pub(crate) fn depth(&self) -> usize {
        self.entries.len() - 1
    }

    pub(crate) fn top(&self) -> Mask {
        self.entries[self.entries.len() - 1]
    }

    pub(crate) fn top_mut(&mut self) -> &mut Mask {
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    /// Entry directly under the top; requires an open scope.
    pub(crate) fn below(&self) -> VmResult<Mask> {
        self.require_scope()?;
        Ok(self.entries[self.entries.len() - 2])
    }

    pub(crate) fn push(&mut self, mask: Mask) -> VmResult<()> {
        if self.entries.len() == PREDICATE_CAPACITY {
            return Err(VmError::capacity(format!(
                "{} stack exceeds {PREDICATE_CAPACITY} entries",
                self.name
            )));
        }
        self.entries.push(mask);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> VmResult<Mask> {
        self.require_scope()?;
        self.entries
            .pop()
            .ok_or_else(|| VmError::bytecode(format!("{} stack is empty", self.name)))
    }

    fn require_scope(&self) -> VmResult<()> {
        if self.depth() == 0 {
            return Err(VmError::bytecode(format!(
                "no open scope on the {} stack",
                self.name
            )));
        }
        Ok(())
    }
}

/// The four predicate stacks of one invocation.
#[derive(Debug, Clone)]
pub(crate) struct Predicates {
    condition: PredicateStack,
    mask: PredicateStack,
    looping: PredicateStack,
    cont: PredicateStack,
}

impl Predicates {
    /// Base state for a batch whose first `lanes` lanes hold data.
    pub(crate) fn new(lanes: usize) -> Self {
        let active = Mask::first(lanes);
        Self {
            condition: PredicateStack::new("condition", active),
            mask: PredicateStack::new("mask", active),
            looping: PredicateStack::new("loop", Mask::ALL),
            cont: PredicateStack::new("continue", Mask::NONE),
        }
    }

    /// Lanes whose side effects take effect at the current instruction.
    pub(crate) fn live(&self) -> Mask {
        self.mask.top() & self.looping.top()
    }

    pub(crate) fn mask_push(&mut self, condition: Mask) -> VmResult<()> {
        let combined = self.mask.top() & condition;
        self.condition.push(condition)?;
        self.mask.push(combined)
    }

    pub(crate) fn mask_pop(&mut self) -> VmResult<()> {
        self.condition.pop()?;
        self.mask.pop()?;
        Ok(())
    }

    /// Switch the innermost scope to its else-branch.
    pub(crate) fn mask_negate(&mut self) -> VmResult<()> {
        let outer = self.mask.below()?;
        let condition = self.condition.top();
        *self.mask.top_mut() = outer & !condition;
        Ok(())
    }

    /// Close the innermost scope, returning the condition that opened it.
    pub(crate) fn mask_blend(&mut self) -> VmResult<Mask> {
        let condition = self.condition.pop()?;
        self.mask.pop()?;
        Ok(condition)
    }

    pub(crate) fn loop_begin(&mut self) -> VmResult<()> {
        let outer = self.looping.top();
        self.cont.push(Mask::NONE)?;
        self.looping.push(outer)
    }

    pub(crate) fn loop_next(&mut self) -> VmResult<()> {
        self.looping.require_scope()?;
        let parked = std::mem::replace(self.cont.top_mut(), Mask::NONE);
        *self.looping.top_mut() |= parked;
        Ok(())
    }

    pub(crate) fn loop_mask(&mut self, keep: Mask) -> VmResult<()> {
        self.looping.require_scope()?;
        *self.looping.top_mut() &= keep;
        Ok(())
    }

    pub(crate) fn loop_end(&mut self) -> VmResult<()> {
        self.cont.pop()?;
        self.looping.pop()?;
        Ok(())
    }

    pub(crate) fn loop_break(&mut self) -> VmResult<()> {
        self.looping.require_scope()?;
        let live = self.live();
        *self.looping.top_mut() &= !live;
        Ok(())
    }

    pub(crate) fn loop_continue(&mut self) -> VmResult<()> {
        self.looping.require_scope()?;
        let live = self.live();
        *self.cont.top_mut() |= live;
        *self.looping.top_mut() &= !live;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/predicate.rs"]
mod tests;
