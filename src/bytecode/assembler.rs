use std::ops::RangeInclusive;

use crate::bytecode::opcode::{
    EXTERNAL_ARGS, Layout, MATRIX_DIM, MAX_VECTOR, MULTIPLY_DIM, Opcode, check_operand,
};
use crate::foundation::error::{VmError, VmResult};

/// Forward or backward branch target inside one function's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Emits one function's instruction stream.
///
/// Every helper checks its operands against the opcode's layout. The first failure is
/// remembered and reported by [`Assembler::finish`], so emission can be chained:
///
/// ```
/// use shadevm::{Assembler, Opcode};
///
/// let mut asm = Assembler::new();
/// asm.load(2, 0).vector(Opcode::AddF, 1).ret(1);
/// let code = asm.finish().unwrap();
/// assert_eq!(code[0], Opcode::Load as u8);
/// ```
#[derive(Debug, Default)]
pub struct Assembler {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    error: Option<VmError>,
}

impl Assembler {
    /// Start an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset of the next instruction.
    pub fn here(&self) -> usize {
        self.code.len()
    }

    /// Allocate an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let here = self.here();
        let err = match self.labels.get_mut(label.0) {
            None => Some(VmError::bytecode(format!("unknown label {}", label.0))),
            Some(slot) => match *slot {
                None => {
                    *slot = Some(here);
                    None
                }
                Some(at) => Some(VmError::bytecode(format!(
                    "label {} bound twice (at {at} and {here})",
                    label.0
                ))),
            },
        };
        if let Some(err) = err {
            self.fail(err);
        }
        self
    }

    /// Emit an instruction without operands.
    pub fn op(&mut self, op: Opcode) -> &mut Self {
        if self.expect(op, Layout::Bare) {
            self.code.push(op.into());
        }
        self
    }

    /// Emit a lane-wise instruction over `count` consecutive values.
    pub fn vector(&mut self, op: Opcode, count: u8) -> &mut Self {
        let max = match op.layout() {
            Layout::Count { max } => max,
            other => {
                self.fail(layout_mismatch(op, other, "vector"));
                return self;
            }
        };
        if self.check(op, "count", count, 1..=max) {
            self.code.extend([op.into(), count]);
        }
        self
    }

    /// Push a broadcast float immediate.
    pub fn push_f32(&mut self, v: f32) -> &mut Self {
        self.push_u32(v.to_bits())
    }

    /// Push a broadcast signed immediate.
    pub fn push_i32(&mut self, v: i32) -> &mut Self {
        self.push_u32(v as u32)
    }

    /// Push a broadcast raw 32-bit immediate.
    pub fn push_u32(&mut self, bits: u32) -> &mut Self {
        self.code.push(Opcode::PushImmediate.into());
        self.code.extend(bits.to_le_bytes());
        self
    }

    /// Push `count` locals starting at `slot`.
    pub fn load(&mut self, count: u8, slot: u8) -> &mut Self {
        self.slot_op(Opcode::Load, count, slot)
    }

    /// Push `count` globals starting at `slot`.
    pub fn load_global(&mut self, count: u8, slot: u8) -> &mut Self {
        self.slot_op(Opcode::LoadGlobal, count, slot)
    }

    /// Push `count` uniforms starting at `slot`.
    pub fn load_uniform(&mut self, count: u8, slot: u8) -> &mut Self {
        self.slot_op(Opcode::LoadUniform, count, slot)
    }

    /// Pop `count` values into locals starting at `slot`.
    pub fn store(&mut self, count: u8, slot: u8) -> &mut Self {
        self.slot_op(Opcode::Store, count, slot)
    }

    /// Pop `count` values into globals starting at `slot`.
    pub fn store_global(&mut self, count: u8, slot: u8) -> &mut Self {
        self.slot_op(Opcode::StoreGlobal, count, slot)
    }

    /// Emit an indexed (per-lane slot) load or store of `count` values.
    pub fn extended(&mut self, op: Opcode, count: u8) -> &mut Self {
        match op.layout() {
            Layout::Extended(_) => {
                if self.check(op, "count", count, 1..=MAX_VECTOR) {
                    self.code.extend([op.into(), count]);
                }
            }
            other => self.fail(layout_mismatch(op, other, "extended")),
        }
        self
    }

    /// Emit an instruction carrying one free-form byte (shift amount, index length, child).
    pub fn byte(&mut self, op: Opcode, operand: u8) -> &mut Self {
        if self.expect(op, Layout::Byte) {
            self.code.extend([op.into(), operand]);
        }
        self
    }

    /// Unconditional jump.
    pub fn branch(&mut self, target: Label) -> &mut Self {
        self.jump(Opcode::Branch, target)
    }

    /// Jump when no lane is live.
    pub fn branch_if_all_false(&mut self, target: Label) -> &mut Self {
        self.jump(Opcode::BranchIfAllFalse, target)
    }

    /// Call the function at `index` in the program.
    pub fn call(&mut self, index: u8) -> &mut Self {
        self.code.extend([Opcode::Call.into(), index]);
        self
    }

    /// Return the top `count` values.
    pub fn ret(&mut self, count: u8) -> &mut Self {
        self.code.extend([Opcode::Return.into(), count]);
        self
    }

    /// Pop `src_count` values and push `indices` selected from them, in order.
    pub fn swizzle(&mut self, src_count: u8, indices: &[u8]) -> &mut Self {
        let op = Opcode::Swizzle;
        if !self.check(op, "source count", src_count, 1..=MAX_VECTOR) {
            return self;
        }
        let Ok(count) = u8::try_from(indices.len()) else {
            self.fail(VmError::bytecode("Swizzle: too many indices"));
            return self;
        };
        if !self.check(op, "count", count, 1..=MAX_VECTOR) {
            return self;
        }
        for &idx in indices {
            if !self.check(op, "index", idx, 0..=src_count - 1) {
                return self;
            }
        }
        self.code.extend([op.into(), src_count, count]);
        self.code.extend_from_slice(indices);
        self
    }

    /// Resize a `src_cols x src_rows` matrix to `dst_cols x dst_rows`.
    pub fn matrix_to_matrix(
        &mut self,
        src_cols: u8,
        src_rows: u8,
        dst_cols: u8,
        dst_rows: u8,
    ) -> &mut Self {
        let op = Opcode::MatrixToMatrix;
        let ok = [src_cols, src_rows, dst_cols, dst_rows]
            .into_iter()
            .all(|d| self.check(op, "dimension", d, MATRIX_DIM));
        if ok {
            self.code
                .extend([op.into(), src_cols, src_rows, dst_cols, dst_rows]);
        }
        self
    }

    /// Multiply an `l_cols x l_rows` matrix by an `r_cols x l_cols` one.
    pub fn matrix_multiply(&mut self, l_cols: u8, l_rows: u8, r_cols: u8) -> &mut Self {
        let op = Opcode::MatrixMultiply;
        let ok = [l_cols, l_rows, r_cols]
            .into_iter()
            .all(|d| self.check(op, "dimension", d, MULTIPLY_DIM));
        if ok {
            self.code.extend([op.into(), l_cols, l_rows, r_cols]);
        }
        self
    }

    /// Pop a scalar and push a `cols x rows` matrix with it on the diagonal.
    pub fn scalar_to_matrix(&mut self, cols: u8, rows: u8) -> &mut Self {
        let op = Opcode::ScalarToMatrix;
        if self.check(op, "columns", cols, MATRIX_DIM) && self.check(op, "rows", rows, MATRIX_DIM)
        {
            self.code.extend([op.into(), cols, rows]);
        }
        self
    }

    /// Call external value `external` with `argc` scalars in and `retc` out.
    pub fn call_external(&mut self, argc: u8, retc: u8, external: u8) -> &mut Self {
        let op = Opcode::CallExternal;
        if self.check(op, "argument count", argc, EXTERNAL_ARGS)
            && self.check(op, "return count", retc, EXTERNAL_ARGS)
        {
            self.code.extend([op.into(), argc, retc, external]);
        }
        self
    }

    /// Read `count` scalars from external value `external`.
    pub fn read_external(&mut self, count: u8, external: u8) -> &mut Self {
        self.external_access(Opcode::ReadExternal, count, external)
    }

    /// Write `count` scalars to external value `external`.
    pub fn write_external(&mut self, count: u8, external: u8) -> &mut Self {
        self.external_access(Opcode::WriteExternal, count, external)
    }

    /// Resolve labels and return the encoded stream.
    pub fn finish(mut self) -> VmResult<Vec<u8>> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        for &(at, label) in &self.fixups {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| VmError::bytecode(format!("label {} never bound", label.0)))?;
            let target = u16::try_from(target).map_err(|_| {
                VmError::bytecode(format!("branch target {target} does not fit in 16 bits"))
            })?;
            self.code[at..at + 2].copy_from_slice(&target.to_le_bytes());
        }
        Ok(self.code)
    }

    fn slot_op(&mut self, op: Opcode, count: u8, slot: u8) -> &mut Self {
        debug_assert!(matches!(op.layout(), Layout::Slot(_)));
        if self.check(op, "count", count, 1..=MAX_VECTOR) {
            if slot.checked_add(count - 1).is_none() {
                self.fail(VmError::bytecode(format!(
                    "{op:?}: slots {slot}+{count} overflow the slot index"
                )));
            } else {
                self.code.extend([op.into(), count, slot]);
            }
        }
        self
    }

    fn external_access(&mut self, op: Opcode, count: u8, external: u8) -> &mut Self {
        if self.check(op, "count", count, 1..=MAX_VECTOR) {
            self.code.extend([op.into(), count, external]);
        }
        self
    }

    fn jump(&mut self, op: Opcode, target: Label) -> &mut Self {
        self.code.push(op.into());
        self.fixups.push((self.code.len(), target));
        self.code.extend([0, 0]);
        self
    }

    fn expect(&mut self, op: Opcode, layout: Layout) -> bool {
        let actual = op.layout();
        if actual == layout {
            true
        } else {
            self.fail(layout_mismatch(op, actual, "this helper"));
            false
        }
    }

    fn check(&mut self, op: Opcode, name: &str, value: u8, range: RangeInclusive<u8>) -> bool {
        match check_operand(op, name, value, range) {
            Ok(_) => true,
            Err(err) => {
                self.fail(err);
                false
            }
        }
    }

    fn fail(&mut self, err: VmError) {
        self.error.get_or_insert(err);
    }
}

fn layout_mismatch(op: Opcode, layout: Layout, helper: &str) -> VmError {
    VmError::bytecode(format!("{op:?} has operand layout {layout:?}, not usable with {helper}"))
}

#[cfg(test)]
#[path = "../../tests/unit/bytecode/assembler.rs"]
mod tests;
