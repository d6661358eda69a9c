use std::sync::Arc;

use anyhow::Context as _;
use smallvec::SmallVec;

use crate::bytecode::cursor::Cursor;
use crate::bytecode::opcode::{
    EXTERNAL_ARGS, Layout, MATRIX_DIM, MAX_VECTOR, MULTIPLY_DIM, Opcode, SHIFT_LIMIT, SlotSpace,
    check_operand,
};
use crate::engine::frame::{CallFrame, Stack};
use crate::engine::predicate::Predicates;
use crate::foundation::error::{VmError, VmResult};
use crate::foundation::lanes::{Mask, VEC_WIDTH, Value};
use crate::foundation::limits::{GLOBAL_CAPACITY, MAX_CALL_DEPTH, STACK_CAPACITY};
use crate::foundation::math;
use crate::program::external::ExternalValue;
use crate::program::model::{Function, Program};

/// Where the outermost `Return` writes its values.
pub(crate) enum ReturnSink<'o, 'r> {
    /// Element `j`, slot `i` lands at `out[j * count + i]`.
    Interleaved(&'o mut [f32]),
    /// Slot `i` of element `offset + j` lands at `outputs[i][offset + j]`.
    Striped {
        outputs: &'o mut [&'r mut [f32]],
        offset: usize,
    },
    /// Return values are computed but not requested.
    Discard,
}

enum Flow {
    Continue,
    Done,
}

struct Position<'p> {
    index: usize,
    function: &'p Function,
    cursor: Cursor<'p>,
}

impl<'p> Position<'p> {
    fn new(index: usize, function: &'p Function) -> Self {
        Self {
            index,
            function,
            cursor: Cursor::new(&function.code),
        }
    }
}

/// Register file and control state for one batch of up to [`VEC_WIDTH`] elements.
///
/// A machine is built per batch and discarded afterwards; nothing persists between batches.
pub(crate) struct Machine<'p> {
    program: &'p Program,
    uniforms: &'p [f32],
    lanes: usize,
    base_index: usize,
    stack: Stack,
    globals: [Value; GLOBAL_CAPACITY],
    predicates: Predicates,
    frames: SmallVec<[CallFrame; 8]>,
    base: usize,
    frame_size: usize,
}

impl<'p> Machine<'p> {
    /// `lanes` elements starting at global element `base_index`.
    pub(crate) fn new(
        program: &'p Program,
        uniforms: &'p [f32],
        lanes: usize,
        base_index: usize,
    ) -> Self {
        Self {
            program,
            uniforms,
            lanes,
            base_index,
            stack: Stack::new(),
            globals: [Value::ZERO; GLOBAL_CAPACITY],
            predicates: Predicates::new(lanes),
            frames: SmallVec::new(),
            base: 0,
            frame_size: 0,
        }
    }

    /// Broadcast each input into its mapped global slot.
    pub(crate) fn seed_inputs(&mut self, inputs: &[f32]) -> VmResult<()> {
        let limit = self.global_limit();
        for (input, (&slot, &v)) in self.program.input_slot_map.iter().zip(inputs).enumerate() {
            if slot >= limit {
                return Err(VmError::shape(format!(
                    "input {input} maps to global {slot}, outside 0..{limit}"
                )));
            }
            self.globals[slot] = Value::splat_f32(v);
        }
        Ok(())
    }

    /// Seed one lane of an entry argument slot. `slot` must be below the stack capacity.
    pub(crate) fn set_arg(&mut self, slot: usize, lane: usize, v: f32) {
        self.stack.values_mut()[slot].set_f32(lane, v);
    }

    pub(crate) fn arg(&self, slot: usize, lane: usize) -> f32 {
        self.stack.get(slot).f32(lane)
    }

    /// Run function `entry` until its outermost `Return`.
    pub(crate) fn execute(&mut self, entry: usize, sink: &mut ReturnSink<'_, '_>) -> VmResult<()> {
        let function = self.function(entry)?;
        self.enter(function, 0)?;
        let mut pos = Position::new(entry, function);
        loop {
            let at = pos.cursor.ip();
            match self.step(&mut pos, sink) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => return Ok(()),
                Err(err) => {
                    tracing::debug!(
                        function = %pos.function.name,
                        offset = at,
                        depth = self.frames.len(),
                        sp = self.stack.sp(),
                        error = %err,
                        "instruction failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    fn step(&mut self, pos: &mut Position<'p>, sink: &mut ReturnSink<'_, '_>) -> VmResult<Flow> {
        let op = pos.cursor.read_opcode()?;
        let c = &mut pos.cursor;
        match op {
            Opcode::AddF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| x + y))?;
            }
            Opcode::AddI => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_i32(b, i32::wrapping_add))?;
            }
            Opcode::SubtractF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| x - y))?;
            }
            Opcode::SubtractI => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_i32(b, i32::wrapping_sub))?;
            }
            Opcode::MultiplyF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| x * y))?;
            }
            Opcode::MultiplyI => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_i32(b, i32::wrapping_mul))?;
            }
            Opcode::DivideF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| x / y))?;
            }
            Opcode::DivideS => {
                let n = read_count(op, c)?;
                self.binary_masked(op, n, |a, b| {
                    (b != 0).then(|| (a as i32).wrapping_div(b as i32) as u32)
                })?;
            }
            Opcode::DivideU => {
                let n = read_count(op, c)?;
                self.binary_masked(op, n, u32::checked_div)?;
            }
            Opcode::RemainderF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| x - (x / y).trunc() * y))?;
            }
            Opcode::RemainderS => {
                let n = read_count(op, c)?;
                self.binary_masked(op, n, |a, b| {
                    (b != 0).then(|| (a as i32).wrapping_rem(b as i32) as u32)
                })?;
            }
            Opcode::RemainderU => {
                let n = read_count(op, c)?;
                self.binary_masked(op, n, u32::checked_rem)?;
            }
            Opcode::MinF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| if y < x { y } else { x }))?;
            }
            Opcode::MinS => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_i32(b, i32::min))?;
            }
            Opcode::MaxF => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, |x, y| if x < y { y } else { x }))?;
            }
            Opcode::MaxS => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_i32(b, i32::max))?;
            }
            Opcode::Pow => {
                let n = read_count(op, c)?;
                self.binary(n, |a, b| a.zip_f32(b, f32::powf))?;
            }
            Opcode::Lerp => {
                let n = read_count(op, c)?;
                self.lerp(n)?;
            }
            Opcode::Mix => {
                let n = read_count(op, c)?;
                self.mix(n)?;
            }
            Opcode::NegateF => {
                let n = read_count(op, c)?;
                self.unary(n, |v| v.map_f32(|x| -x))?;
            }
            Opcode::NegateI => {
                let n = read_count(op, c)?;
                self.unary(n, |v| v.map_i32(i32::wrapping_neg))?;
            }
            Opcode::NotB => {
                let n = read_count(op, c)?;
                self.unary(n, |v| v.map_u32(|x| !x))?;
            }
            Opcode::Sin => self.unary(read_count(op, c)?, |v| v.map_f32(f32::sin))?,
            Opcode::Cos => self.unary(read_count(op, c)?, |v| v.map_f32(f32::cos))?,
            Opcode::Tan => self.unary(read_count(op, c)?, |v| v.map_f32(f32::tan))?,
            Opcode::ATan => self.unary(read_count(op, c)?, |v| v.map_f32(f32::atan))?,
            Opcode::Sqrt => self.unary(read_count(op, c)?, |v| v.map_f32(f32::sqrt))?,
            Opcode::Floor => self.unary(read_count(op, c)?, |v| v.map_f32(f32::floor))?,
            Opcode::Ceil => self.unary(read_count(op, c)?, |v| v.map_f32(f32::ceil))?,
            Opcode::Fract => {
                self.unary(read_count(op, c)?, |v| v.map_f32(|x| x - x.floor()))?;
            }
            Opcode::ConvertFtoI => {
                let n = read_count(op, c)?;
                self.unary(n, |v| v.map_u32(|b| f32::from_bits(b) as i32 as u32))?;
            }
            Opcode::ConvertStoF => {
                let n = read_count(op, c)?;
                self.unary(n, |v| v.map_u32(|b| (b as i32 as f32).to_bits()))?;
            }
            Opcode::ConvertUtoF => {
                let n = read_count(op, c)?;
                self.unary(n, |v| v.map_u32(|b| (b as f32).to_bits()))?;
            }

            Opcode::CompareFEQ => self.compare(op, c, |a, b, l| a.f32(l) == b.f32(l))?,
            Opcode::CompareFNEQ => self.compare(op, c, |a, b, l| a.f32(l) != b.f32(l))?,
            Opcode::CompareIEQ => self.compare(op, c, |a, b, l| a.i32(l) == b.i32(l))?,
            Opcode::CompareINEQ => self.compare(op, c, |a, b, l| a.i32(l) != b.i32(l))?,
            Opcode::CompareFLT => self.compare(op, c, |a, b, l| a.f32(l) < b.f32(l))?,
            Opcode::CompareFLTEQ => self.compare(op, c, |a, b, l| a.f32(l) <= b.f32(l))?,
            Opcode::CompareFGT => self.compare(op, c, |a, b, l| a.f32(l) > b.f32(l))?,
            Opcode::CompareFGTEQ => self.compare(op, c, |a, b, l| a.f32(l) >= b.f32(l))?,
            Opcode::CompareSLT => self.compare(op, c, |a, b, l| a.i32(l) < b.i32(l))?,
            Opcode::CompareSLTEQ => self.compare(op, c, |a, b, l| a.i32(l) <= b.i32(l))?,
            Opcode::CompareSGT => self.compare(op, c, |a, b, l| a.i32(l) > b.i32(l))?,
            Opcode::CompareSGTEQ => self.compare(op, c, |a, b, l| a.i32(l) >= b.i32(l))?,
            Opcode::CompareULT => self.compare(op, c, |a, b, l| a.u32(l) < b.u32(l))?,
            Opcode::CompareULTEQ => self.compare(op, c, |a, b, l| a.u32(l) <= b.u32(l))?,
            Opcode::CompareUGT => self.compare(op, c, |a, b, l| a.u32(l) > b.u32(l))?,
            Opcode::CompareUGTEQ => self.compare(op, c, |a, b, l| a.u32(l) >= b.u32(l))?,

            // Booleans are 0 / all ones, so bitwise ops are logical ops.
            Opcode::AndB => self.binary(1, |a, b| a.zip_u32(b, |x, y| x & y))?,
            Opcode::OrB => self.binary(1, |a, b| a.zip_u32(b, |x, y| x | y))?,
            Opcode::XorB => self.binary(1, |a, b| a.zip_u32(b, |x, y| x ^ y))?,

            Opcode::ShiftLeft | Opcode::ShiftRightS | Opcode::ShiftRightU => {
                let amount = check_operand(op, "shift", c.read_u8()?, 0..=SHIFT_LIMIT - 1)? as u32;
                let at = self.stack.top(1)?;
                let v = self.stack.get(at);
                let shifted = match op {
                    Opcode::ShiftLeft => v.map_i32(|x| x << amount),
                    Opcode::ShiftRightS => v.map_i32(|x| x >> amount),
                    _ => v.map_u32(|x| x >> amount),
                };
                self.stack.set(at, shifted);
            }

            Opcode::Load | Opcode::LoadGlobal | Opcode::LoadUniform => {
                let n = read_count(op, c)?;
                let slot = c.read_u8()? as usize;
                self.load(op, n, slot)?;
            }
            Opcode::Store | Opcode::StoreGlobal => {
                let n = read_count(op, c)?;
                let slot = c.read_u8()? as usize;
                self.store(op, n, slot)?;
            }
            Opcode::LoadExtended | Opcode::LoadExtendedGlobal | Opcode::LoadExtendedUniform => {
                let n = read_count(op, c)?;
                self.load_extended(op, n)?;
            }
            Opcode::StoreExtended | Opcode::StoreExtendedGlobal => {
                let n = read_count(op, c)?;
                self.store_extended(op, n)?;
            }
            Opcode::ClampIndex => {
                let length = i32::from(c.read_u8()?);
                let index = self.stack.get(self.stack.top(1)?);
                for lane in self.predicates.live().active() {
                    let i = index.i32(lane);
                    if i < 0 || i >= length {
                        return Err(VmError::bounds(format!(
                            "index {i} in lane {lane} outside 0..{length}"
                        )));
                    }
                }
            }
            Opcode::PushImmediate => {
                let bits = c.read_u32()?;
                self.stack.push(Value::splat_bits(bits))?;
            }

            Opcode::Dup => {
                let n = read_count(op, c)?;
                let start = self.stack.top(n)?;
                self.stack.ensure(n)?;
                for i in start..start + n {
                    self.stack.push(self.stack.get(i))?;
                }
            }
            Opcode::Pop => {
                let n = read_count(op, c)?;
                let start = self.stack.top(n)?;
                self.stack.truncate(start);
            }
            Opcode::Reserve => {
                let n = read_count(op, c)?;
                self.stack.ensure(n)?;
                for _ in 0..n {
                    self.stack.push(Value::ZERO)?;
                }
            }
            Opcode::Swizzle => self.swizzle(op, c)?,
            Opcode::MatrixToMatrix => {
                let mut dims = [0usize; 4];
                for d in &mut dims {
                    *d = check_operand(op, "dimension", c.read_u8()?, MATRIX_DIM)? as usize;
                }
                let [src_cols, src_rows, dst_cols, dst_rows] = dims;
                let start = self.stack.top(src_cols * src_rows)?;
                let resized = math::resize(
                    &self.stack.values()[start..start + src_cols * src_rows],
                    src_cols,
                    src_rows,
                    dst_cols,
                    dst_rows,
                );
                self.stack.truncate(start);
                self.push_all(&resized[..dst_cols * dst_rows])?;
            }
            Opcode::MatrixMultiply => {
                let mut dims = [0usize; 3];
                for d in &mut dims {
                    *d = check_operand(op, "dimension", c.read_u8()?, MULTIPLY_DIM)? as usize;
                }
                let [l_cols, l_rows, r_cols] = dims;
                let lhs_len = l_cols * l_rows;
                let rhs_len = r_cols * l_cols;
                let start = self.stack.top(lhs_len + rhs_len)?;
                let mut product = [Value::ZERO; 16];
                let values = self.stack.values();
                math::multiply(
                    &values[start..start + lhs_len],
                    &values[start + lhs_len..start + lhs_len + rhs_len],
                    l_cols,
                    l_rows,
                    r_cols,
                    &mut product[..r_cols * l_rows],
                );
                self.stack.truncate(start);
                self.push_all(&product[..r_cols * l_rows])?;
            }
            Opcode::ScalarToMatrix => {
                let cols = check_operand(op, "columns", c.read_u8()?, MATRIX_DIM)? as usize;
                let rows = check_operand(op, "rows", c.read_u8()?, MATRIX_DIM)? as usize;
                let v = self.stack.pop()?;
                self.stack.ensure(cols * rows)?;
                for col in 0..cols {
                    for row in 0..rows {
                        self.stack.push(if col == row { v } else { Value::ZERO })?;
                    }
                }
            }
            Opcode::Inverse2x2 => {
                let start = self.stack.top(4)?;
                math::lanewise::<4>(&mut self.stack.values_mut()[start..start + 4], math::invert2);
            }
            Opcode::Inverse3x3 => {
                let start = self.stack.top(9)?;
                math::lanewise::<9>(&mut self.stack.values_mut()[start..start + 9], math::invert3);
            }
            Opcode::Inverse4x4 => {
                let start = self.stack.top(16)?;
                math::lanewise::<16>(
                    &mut self.stack.values_mut()[start..start + 16],
                    math::invert4,
                );
            }

            Opcode::Branch => {
                let target = c.read_u16()? as usize;
                c.jump(target)?;
            }
            Opcode::BranchIfAllFalse => {
                let target = c.read_u16()? as usize;
                if !self.predicates.live().any() {
                    c.jump(target)?;
                }
            }
            Opcode::Call => {
                let target = c.read_u8()? as usize;
                if self.predicates.live().any() {
                    self.call(pos, target)?;
                }
            }
            Opcode::Return => {
                let count = c.read_u8()? as usize;
                if count != pos.function.return_count {
                    return Err(VmError::shape(format!(
                        "'{}' returns {count} slots, declared {}",
                        pos.function.name, pos.function.return_count
                    )));
                }
                let start = self.stack.top(count)?;
                match self.frames.pop() {
                    None => {
                        self.write_return(start, count, sink)?;
                        return Ok(Flow::Done);
                    }
                    Some(frame) => self.unwind(pos, frame, start, count)?,
                }
            }

            Opcode::MaskPush => {
                let condition = self.stack.pop()?.truthy();
                self.predicates.mask_push(condition)?;
            }
            Opcode::MaskPop => self.predicates.mask_pop()?,
            Opcode::MaskNegate => self.predicates.mask_negate()?,
            Opcode::MaskBlend => {
                let n = read_count(op, c)?;
                let condition = self.predicates.mask_blend()?;
                let start = self.stack.top(2 * n)?;
                for i in start..start + n {
                    let taken = self.stack.get(i);
                    let other = self.stack.get(i + n);
                    self.stack.set(i, Value::select(condition, taken, other));
                }
                self.stack.truncate(start + n);
            }
            Opcode::LoopBegin => self.predicates.loop_begin()?,
            Opcode::LoopNext => self.predicates.loop_next()?,
            Opcode::LoopMask => {
                let keep = self.stack.pop()?.truthy();
                self.predicates.loop_mask(keep)?;
            }
            Opcode::LoopEnd => self.predicates.loop_end()?,
            Opcode::LoopBreak => self.predicates.loop_break()?,
            Opcode::LoopContinue => self.predicates.loop_continue()?,

            Opcode::CallExternal => self.call_external(op, c)?,
            Opcode::ReadExternal => {
                let n = read_count(op, c)?;
                let slot = c.read_u8()?;
                let external = self.external(slot)?;
                self.stack.ensure(n)?;
                let mut read = [Value::ZERO; MAX_VECTOR as usize];
                for lane in self.predicates.live().active() {
                    let element = self.base_index + lane;
                    let mut scalars = [0.0f32; MAX_VECTOR as usize];
                    external
                        .read(element, &mut scalars[..n])
                        .with_context(|| format!("external {slot} read for element {element}"))?;
                    for (v, s) in read.iter_mut().zip(&scalars[..n]) {
                        v.set_f32(lane, *s);
                    }
                }
                self.push_all(&read[..n])?;
            }
            Opcode::WriteExternal => {
                let n = read_count(op, c)?;
                let slot = c.read_u8()?;
                let external = self.external(slot)?;
                let start = self.stack.top(n)?;
                for lane in self.predicates.live().active() {
                    let element = self.base_index + lane;
                    let mut scalars = [0.0f32; MAX_VECTOR as usize];
                    for (i, s) in scalars[..n].iter_mut().enumerate() {
                        *s = self.stack.get(start + i).f32(lane);
                    }
                    external
                        .write(element, &scalars[..n])
                        .with_context(|| format!("external {slot} write for element {element}"))?;
                }
                self.stack.truncate(start);
            }

            Opcode::LoadFragCoord | Opcode::SampleExplicit | Opcode::SampleMatrix => {
                return Err(VmError::unsupported(format!("{op:?}")));
            }
        }
        Ok(Flow::Continue)
    }

    fn function(&self, index: usize) -> VmResult<&'p Function> {
        self.program.functions.get(index).ok_or_else(|| {
            VmError::bytecode(format!(
                "function {index} does not exist ({} defined)",
                self.program.functions.len()
            ))
        })
    }

    fn external(&self, index: u8) -> VmResult<&'p Arc<dyn ExternalValue>> {
        let externals = self.program.external_values();
        externals.get(index as usize).ok_or_else(|| {
            VmError::bytecode(format!(
                "external value {index} not attached ({} available)",
                externals.len()
            ))
        })
    }

    fn global_limit(&self) -> usize {
        self.program.global_slot_count.min(GLOBAL_CAPACITY)
    }

    /// Open `f`'s frame at `base`: parameters are already in place, locals are zeroed.
    fn enter(&mut self, f: &Function, base: usize) -> VmResult<()> {
        if base.saturating_add(f.stack_need()) > STACK_CAPACITY {
            return Err(VmError::capacity(format!(
                "'{}' needs {} stack values at depth {base}, capacity is {STACK_CAPACITY}",
                f.name,
                f.stack_need()
            )));
        }
        let end = base + f.frame_size();
        self.stack.set_sp(end)?;
        for i in base + f.parameter_count..end {
            self.stack.set(i, Value::ZERO);
        }
        self.stack.floor = end;
        self.base = base;
        self.frame_size = f.frame_size();
        Ok(())
    }

    fn call(&mut self, pos: &mut Position<'p>, target: usize) -> VmResult<()> {
        if self.frames.len() == MAX_CALL_DEPTH {
            return Err(VmError::capacity(format!(
                "call depth exceeds {MAX_CALL_DEPTH}"
            )));
        }
        let callee = self.function(target)?;
        let base = self.stack.top(callee.parameter_count)?;
        let frame = CallFrame {
            function: pos.index,
            return_ip: pos.cursor.ip(),
            base: self.base,
            floor: self.stack.floor,
            parameter_count: callee.parameter_count,
        };
        self.enter(callee, base)?;
        self.frames.push(frame);
        *pos = Position::new(target, callee);
        Ok(())
    }

    /// Copy return values into the caller's reserved slots and resume the caller with the
    /// callee's parameters still on the stack.
    fn unwind(
        &mut self,
        pos: &mut Position<'p>,
        frame: CallFrame,
        start: usize,
        count: usize,
    ) -> VmResult<()> {
        let dest = self
            .base
            .checked_sub(count)
            .filter(|&d| d >= frame.floor)
            .ok_or_else(|| {
                VmError::bytecode(format!("caller reserved no room for {count} return values"))
            })?;
        for i in 0..count {
            self.stack.set(dest + i, self.stack.get(start + i));
        }
        self.stack.set_sp(self.base + frame.parameter_count)?;
        self.stack.floor = frame.floor;
        self.base = frame.base;
        let caller = self.function(frame.function)?;
        self.frame_size = caller.frame_size();
        *pos = Position::new(frame.function, caller);
        pos.cursor.jump(frame.return_ip)?;
        Ok(())
    }

    fn write_return(
        &self,
        start: usize,
        count: usize,
        sink: &mut ReturnSink<'_, '_>,
    ) -> VmResult<()> {
        match sink {
            ReturnSink::Interleaved(out) => {
                let needed = count * self.lanes;
                if out.len() < needed {
                    return Err(VmError::shape(format!(
                        "return buffer holds {}, need {needed}",
                        out.len()
                    )));
                }
                for i in 0..count {
                    let v = self.stack.get(start + i);
                    for lane in 0..self.lanes {
                        out[lane * count + i] = v.f32(lane);
                    }
                }
            }
            ReturnSink::Striped { outputs, offset } => {
                if outputs.len() < count {
                    return Err(VmError::shape(format!(
                        "{} return arrays, need {count}",
                        outputs.len()
                    )));
                }
                for (i, out) in outputs.iter_mut().take(count).enumerate() {
                    let len = out.len();
                    let dst = out.get_mut(*offset..*offset + self.lanes).ok_or_else(|| {
                        VmError::shape(format!(
                            "return array {i} holds {len}, need {}",
                            *offset + self.lanes
                        ))
                    })?;
                    let v = self.stack.get(start + i);
                    for (lane, d) in dst.iter_mut().enumerate() {
                        *d = v.f32(lane);
                    }
                }
            }
            ReturnSink::Discard => {}
        }
        Ok(())
    }

    fn push_all(&mut self, values: &[Value]) -> VmResult<()> {
        self.stack.ensure(values.len())?;
        for &v in values {
            self.stack.push(v)?;
        }
        Ok(())
    }

    /// `a[i] = f(a[i], b[i])` over `[a0..an, b0..bn]`, leaving `a`.
    fn binary(&mut self, n: usize, f: impl Fn(Value, Value) -> Value) -> VmResult<()> {
        let start = self.stack.top(2 * n)?;
        for i in start..start + n {
            let r = f(self.stack.get(i), self.stack.get(i + n));
            self.stack.set(i, r);
        }
        self.stack.truncate(start + n);
        Ok(())
    }

    /// Like [`Machine::binary`] but evaluated only on live lanes; `None` is division by zero.
    fn binary_masked(
        &mut self,
        op: Opcode,
        n: usize,
        f: impl Fn(u32, u32) -> Option<u32>,
    ) -> VmResult<()> {
        let live = self.predicates.live();
        let start = self.stack.top(2 * n)?;
        for i in start..start + n {
            let mut a = self.stack.get(i);
            let b = self.stack.get(i + n);
            for lane in live.active() {
                let r = f(a.bits(lane), b.bits(lane)).ok_or_else(|| {
                    VmError::arithmetic(format!("{op:?}: division by zero in lane {lane}"))
                })?;
                a.set_bits(lane, r);
            }
            self.stack.set(i, a);
        }
        self.stack.truncate(start + n);
        Ok(())
    }

    fn unary(&mut self, n: usize, f: impl Fn(Value) -> Value) -> VmResult<()> {
        let start = self.stack.top(n)?;
        for i in start..start + n {
            let r = f(self.stack.get(i));
            self.stack.set(i, r);
        }
        Ok(())
    }

    fn compare(
        &mut self,
        op: Opcode,
        c: &mut Cursor<'_>,
        f: impl Fn(Value, Value, usize) -> bool + Copy,
    ) -> VmResult<()> {
        let n = read_count(op, c)?;
        self.binary(n, |a, b| a.test(b, f))
    }

    /// `a + (b - a) * t` over `[a.., b.., t..]`.
    fn lerp(&mut self, n: usize) -> VmResult<()> {
        let start = self.stack.top(3 * n)?;
        for i in start..start + n {
            let (a, b, t) = (
                self.stack.get(i),
                self.stack.get(i + n),
                self.stack.get(i + 2 * n),
            );
            let mut r = a;
            for lane in 0..VEC_WIDTH {
                let (a, b, t) = (a.f32(lane), b.f32(lane), t.f32(lane));
                r.set_f32(lane, a + (b - a) * t);
            }
            self.stack.set(i, r);
        }
        self.stack.truncate(start + n);
        Ok(())
    }

    /// `cond ? t : f` over `[f.., t.., cond..]`.
    fn mix(&mut self, n: usize) -> VmResult<()> {
        let start = self.stack.top(3 * n)?;
        for i in start..start + n {
            let condition = self.stack.get(i + 2 * n).truthy();
            let r = Value::select(condition, self.stack.get(i + n), self.stack.get(i));
            self.stack.set(i, r);
        }
        self.stack.truncate(start + n);
        Ok(())
    }

    fn slot_space(op: Opcode) -> VmResult<SlotSpace> {
        match op.layout() {
            Layout::Slot(space) | Layout::Extended(space) => Ok(space),
            other => Err(VmError::bytecode(format!(
                "{op:?} has layout {other:?}, not a slot access"
            ))),
        }
    }

    fn slot_limit(&self, space: SlotSpace) -> usize {
        match space {
            SlotSpace::Local => self.frame_size,
            SlotSpace::Global => self.global_limit(),
            SlotSpace::Uniform => self.uniforms.len(),
        }
    }

    fn check_slots(&self, op: Opcode, space: SlotSpace, slot: usize, n: usize) -> VmResult<()> {
        let limit = self.slot_limit(space);
        if slot + n > limit {
            return Err(VmError::bounds(format!(
                "{op:?}: {} slots {slot}..{} outside 0..{limit}",
                space.name(),
                slot + n
            )));
        }
        Ok(())
    }

    fn load(&mut self, op: Opcode, n: usize, slot: usize) -> VmResult<()> {
        let space = Self::slot_space(op)?;
        self.check_slots(op, space, slot, n)?;
        self.stack.ensure(n)?;
        for i in slot..slot + n {
            let v = match space {
                SlotSpace::Local => self.stack.get(self.base + i),
                SlotSpace::Global => self.globals[i],
                SlotSpace::Uniform => Value::splat_f32(self.uniforms[i]),
            };
            self.stack.push(v)?;
        }
        Ok(())
    }

    /// Pop `n` values into `slot..slot + n` (top value into the highest slot), live lanes only.
    fn store(&mut self, op: Opcode, n: usize, slot: usize) -> VmResult<()> {
        let space = Self::slot_space(op)?;
        self.check_slots(op, space, slot, n)?;
        let live = self.predicates.live();
        let start = self.stack.top(n)?;
        for i in 0..n {
            let v = self.stack.get(start + i);
            match space {
                SlotSpace::Local => {
                    let at = self.base + slot + i;
                    let old = self.stack.get(at);
                    self.stack.set(at, Value::select(live, v, old));
                }
                SlotSpace::Global => {
                    let old = self.globals[slot + i];
                    self.globals[slot + i] = Value::select(live, v, old);
                }
                SlotSpace::Uniform => {
                    return Err(VmError::bytecode(format!("{op:?}: uniforms are read-only")));
                }
            }
        }
        self.stack.truncate(start);
        Ok(())
    }

    /// Per-lane first slot of an indexed access, checked for every live lane.
    fn lane_offsets(
        &self,
        op: Opcode,
        space: SlotSpace,
        index: Value,
        live: Mask,
        n: usize,
    ) -> VmResult<[usize; VEC_WIDTH]> {
        let limit = self.slot_limit(space);
        let mut offsets = [0usize; VEC_WIDTH];
        for lane in live.active() {
            let i = index.i32(lane);
            match usize::try_from(i) {
                Ok(at) if at + n <= limit => offsets[lane] = at,
                _ => {
                    return Err(VmError::bounds(format!(
                        "{op:?}: {} index {i} (+{n}) in lane {lane} outside 0..{limit}",
                        space.name()
                    )));
                }
            }
        }
        Ok(offsets)
    }

    fn load_extended(&mut self, op: Opcode, n: usize) -> VmResult<()> {
        let space = Self::slot_space(op)?;
        let index = self.stack.pop()?;
        let live = self.predicates.live();
        let offsets = self.lane_offsets(op, space, index, live, n)?;
        let mut gathered = [Value::ZERO; MAX_VECTOR as usize];
        for (i, v) in gathered[..n].iter_mut().enumerate() {
            for lane in live.active() {
                let at = offsets[lane] + i;
                let bits = match space {
                    SlotSpace::Local => self.stack.get(self.base + at).bits(lane),
                    SlotSpace::Global => self.globals[at].bits(lane),
                    SlotSpace::Uniform => self.uniforms[at].to_bits(),
                };
                v.set_bits(lane, bits);
            }
        }
        self.push_all(&gathered[..n])
    }

    fn store_extended(&mut self, op: Opcode, n: usize) -> VmResult<()> {
        let space = Self::slot_space(op)?;
        let index = self.stack.pop()?;
        let live = self.predicates.live();
        let offsets = self.lane_offsets(op, space, index, live, n)?;
        let start = self.stack.top(n)?;
        for i in 0..n {
            let v = self.stack.get(start + i);
            for lane in live.active() {
                let at = offsets[lane] + i;
                match space {
                    SlotSpace::Local => {
                        let mut slot = self.stack.get(self.base + at);
                        slot.set_bits(lane, v.bits(lane));
                        self.stack.set(self.base + at, slot);
                    }
                    SlotSpace::Global => self.globals[at].set_bits(lane, v.bits(lane)),
                    SlotSpace::Uniform => {
                        return Err(VmError::bytecode(format!("{op:?}: uniforms are read-only")));
                    }
                }
            }
        }
        self.stack.truncate(start);
        Ok(())
    }

    fn swizzle(&mut self, op: Opcode, c: &mut Cursor<'_>) -> VmResult<()> {
        let src = check_operand(op, "source count", c.read_u8()?, 1..=MAX_VECTOR)?;
        let count = check_operand(op, "count", c.read_u8()?, 1..=MAX_VECTOR)?;
        let start = self.stack.top(src as usize)?;
        let mut picked = [Value::ZERO; MAX_VECTOR as usize];
        for v in &mut picked[..count as usize] {
            let idx = check_operand(op, "index", c.read_u8()?, 0..=src - 1)? as usize;
            *v = self.stack.get(start + idx);
        }
        self.stack.truncate(start);
        self.push_all(&picked[..count as usize])
    }

    /// Results overwrite the arguments in place: `argc` in, `retc` out.
    fn call_external(&mut self, op: Opcode, c: &mut Cursor<'_>) -> VmResult<()> {
        let argc = check_operand(op, "argument count", c.read_u8()?, EXTERNAL_ARGS)? as usize;
        let retc = check_operand(op, "return count", c.read_u8()?, EXTERNAL_ARGS)? as usize;
        let slot = c.read_u8()?;
        let external = self.external(slot)?;
        let start = self.stack.top(argc)?;
        self.stack.ensure(retc.saturating_sub(argc))?;

        let mut results = [Value::ZERO; MAX_VECTOR as usize];
        for (k, r) in results[..retc].iter_mut().enumerate() {
            if k < argc {
                *r = self.stack.get(start + k);
            }
        }
        for lane in self.predicates.live().active() {
            let element = self.base_index + lane;
            let mut args = [0.0f32; MAX_VECTOR as usize];
            for (k, a) in args[..argc].iter_mut().enumerate() {
                *a = self.stack.get(start + k).f32(lane);
            }
            let mut out = [0.0f32; MAX_VECTOR as usize];
            external
                .call(element, &args[..argc], &mut out[..retc])
                .with_context(|| format!("external {slot} call for element {element}"))?;
            for (r, s) in results[..retc].iter_mut().zip(&out[..retc]) {
                r.set_f32(lane, *s);
            }
        }
        self.stack.truncate(start);
        self.push_all(&results[..retc])
    }
}

fn read_count(op: Opcode, c: &mut Cursor<'_>) -> VmResult<usize> {
    let max = match op.layout() {
        Layout::Count { max } => max,
        _ => MAX_VECTOR,
    };
    Ok(check_operand(op, "count", c.read_u8()?, 1..=max)? as usize)
}

#[cfg(test)]
#[path = "../../tests/unit/engine/interpreter.rs"]
mod tests;
