/// Instruction tag: the first byte of every encoded instruction.
///
/// Discriminants are the wire encoding; they are assigned explicitly and never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    // === Lane-wise arithmetic (operand: count) ===
    /// `a + b` on floats.
    AddF = 0,
    /// `a + b` on signed integers (wrapping).
    AddI = 1,
    /// `a - b` on floats.
    SubtractF = 2,
    /// `a - b` on signed integers (wrapping).
    SubtractI = 3,
    /// `a * b` on floats.
    MultiplyF = 4,
    /// `a * b` on signed integers (wrapping).
    MultiplyI = 5,
    /// `a / b` on floats.
    DivideF = 6,
    /// `a / b` on signed integers, active lanes only.
    DivideS = 7,
    /// `a / b` on unsigned integers, active lanes only.
    DivideU = 8,
    /// `a - trunc(a / b) * b` on floats.
    RemainderF = 9,
    /// `a % b` on signed integers, active lanes only.
    RemainderS = 10,
    /// `a % b` on unsigned integers, active lanes only.
    RemainderU = 11,
    /// Float minimum.
    MinF = 12,
    /// Signed minimum.
    MinS = 13,
    /// Float maximum.
    MaxF = 14,
    /// Signed maximum.
    MaxS = 15,
    /// `pow(a, b)` on floats.
    Pow = 16,
    /// `a + (b - a) * t` on floats; pops `b` and `t`.
    Lerp = 17,
    /// `cond ? t : f` where the stack holds `f, t, cond`.
    Mix = 18,
    /// Float negation.
    NegateF = 19,
    /// Signed negation (wrapping).
    NegateI = 20,
    /// Bitwise not of boolean lanes.
    NotB = 21,
    /// Sine.
    Sin = 22,
    /// Cosine.
    Cos = 23,
    /// Tangent.
    Tan = 24,
    /// Arc tangent.
    ATan = 25,
    /// Square root.
    Sqrt = 26,
    /// Round toward negative infinity.
    Floor = 27,
    /// Round toward positive infinity.
    Ceil = 28,
    /// `x - floor(x)`.
    Fract = 29,
    /// Float to signed integer (saturating).
    ConvertFtoI = 30,
    /// Signed integer to float.
    ConvertStoF = 31,
    /// Unsigned integer to float.
    ConvertUtoF = 32,

    // === Comparisons (operand: count), result lanes are 0 / all ones ===
    /// Float `==`.
    CompareFEQ = 33,
    /// Float `!=`.
    CompareFNEQ = 34,
    /// Integer `==`.
    CompareIEQ = 35,
    /// Integer `!=`.
    CompareINEQ = 36,
    /// Float `<`.
    CompareFLT = 37,
    /// Float `<=`.
    CompareFLTEQ = 38,
    /// Float `>`.
    CompareFGT = 39,
    /// Float `>=`.
    CompareFGTEQ = 40,
    /// Signed `<`.
    CompareSLT = 41,
    /// Signed `<=`.
    CompareSLTEQ = 42,
    /// Signed `>`.
    CompareSGT = 43,
    /// Signed `>=`.
    CompareSGTEQ = 44,
    /// Unsigned `<`.
    CompareULT = 45,
    /// Unsigned `<=`.
    CompareULTEQ = 46,
    /// Unsigned `>`.
    CompareUGT = 47,
    /// Unsigned `>=`.
    CompareUGTEQ = 48,

    // === Scalar boolean logic (no operands) ===
    /// Bitwise and of two booleans.
    AndB = 49,
    /// Bitwise or of two booleans.
    OrB = 50,
    /// Bitwise xor of two booleans.
    XorB = 51,

    // === Shifts (operand: amount) ===
    /// Shift left.
    ShiftLeft = 52,
    /// Arithmetic shift right.
    ShiftRightS = 53,
    /// Logical shift right.
    ShiftRightU = 54,

    // === Memory ===
    /// Push `count` locals starting at `slot`.
    Load = 55,
    /// Push `count` globals starting at `slot`.
    LoadGlobal = 56,
    /// Push `count` uniforms (broadcast) starting at `slot`.
    LoadUniform = 57,
    /// Pop `count` values into locals starting at `slot`, masked.
    Store = 58,
    /// Pop `count` values into globals starting at `slot`, masked.
    StoreGlobal = 59,
    /// Pop a per-lane local index, push `count` gathered values.
    LoadExtended = 60,
    /// Pop a per-lane global index, push `count` gathered values.
    LoadExtendedGlobal = 61,
    /// Pop a per-lane uniform index, push `count` gathered values.
    LoadExtendedUniform = 62,
    /// Pop a per-lane local index and `count` values, scatter masked.
    StoreExtended = 63,
    /// Pop a per-lane global index and `count` values, scatter masked.
    StoreExtendedGlobal = 64,
    /// Fail unless every active lane of the top value is in `0..length`.
    ClampIndex = 65,
    /// Push a broadcast 32-bit immediate.
    PushImmediate = 66,

    // === Structural ===
    /// Duplicate the top `count` values.
    Dup = 67,
    /// Discard the top `count` values.
    Pop = 68,
    /// Reserve `count` zeroed values (return space before a call).
    Reserve = 69,
    /// Pop `src` values, push a selection of them.
    Swizzle = 70,
    /// Resize a matrix, filling new entries from identity.
    MatrixToMatrix = 71,
    /// Multiply two column-major matrices (or matrix and vector).
    MatrixMultiply = 72,
    /// Pop a scalar, push a diagonal matrix.
    ScalarToMatrix = 73,
    /// Invert the 2x2 matrix on top of the stack.
    Inverse2x2 = 74,
    /// Invert the 3x3 matrix on top of the stack.
    Inverse3x3 = 75,
    /// Invert the 4x4 matrix on top of the stack.
    Inverse4x4 = 76,

    // === Control ===
    /// Jump to an absolute offset.
    Branch = 77,
    /// Jump when no lane is live.
    BranchIfAllFalse = 78,
    /// Call a function by index.
    Call = 79,
    /// Return the top `count` values.
    Return = 80,

    // === Predication ===
    /// Pop a condition and enter a masked scope.
    MaskPush = 81,
    /// Leave the innermost masked scope.
    MaskPop = 82,
    /// Flip the innermost scope to its else-branch.
    MaskNegate = 83,
    /// Merge `count` true/false values under the innermost condition and leave the scope.
    MaskBlend = 84,
    /// Enter a loop.
    LoopBegin = 85,
    /// Re-admit continuing lanes at the back edge.
    LoopNext = 86,
    /// Pop the loop condition and retire lanes for which it is false.
    LoopMask = 87,
    /// Leave a loop.
    LoopEnd = 88,
    /// Retire live lanes from the loop.
    LoopBreak = 89,
    /// Park live lanes until the next iteration.
    LoopContinue = 90,

    // === Host interop ===
    /// Call an external value once per live lane.
    CallExternal = 91,
    /// Read `count` floats from an external value per live lane.
    ReadExternal = 92,
    /// Write `count` floats to an external value per live lane.
    WriteExternal = 93,

    // === Recognised but not executable in software ===
    /// Fragment coordinate load.
    LoadFragCoord = 94,
    /// Explicit-coordinate child sample.
    SampleExplicit = 95,
    /// Matrix-transformed child sample.
    SampleMatrix = 96,
}

use std::ops::RangeInclusive;

use crate::foundation::error::{VmError, VmResult};

/// Which register file a slot operand addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotSpace {
    Local,
    Global,
    Uniform,
}

impl SlotSpace {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::Uniform => "uniform",
        }
    }
}

/// Inline operand shape following the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    Bare,
    /// `count: u8` in `1..=max`.
    Count { max: u8 },
    /// `count: u8, slot: u8`.
    Slot(SlotSpace),
    /// `count: u8`; index popped at runtime.
    Extended(SlotSpace),
    /// One free-form byte (shift amount, index length, child index).
    Byte,
    Imm32,
    Target,
    Function,
    /// `src: u8, count: u8, idx: u8 * count`.
    Swizzle,
    /// `src_cols, src_rows, dst_cols, dst_rows`.
    MatrixResize,
    /// `l_cols, l_rows, r_cols`.
    MatrixMultiply,
    /// `cols, rows`.
    MatrixShape,
    /// `count: u8`, zero allowed.
    Return,
    /// `argc, retc, external`.
    ExternalCall,
    /// `count, external`.
    ExternalAccess,
}

/// Widest short vector a lane-wise family accepts.
pub(crate) const MAX_VECTOR: u8 = 4;
/// Widest run accepted by families with a matrix ("N") form.
pub(crate) const MAX_MATRIX: u8 = 16;
/// Column or row count of a matrix operand.
pub(crate) const MATRIX_DIM: RangeInclusive<u8> = 2..=4;
/// Column or row count of a matrix-multiply operand (vectors are one column or row wide).
pub(crate) const MULTIPLY_DIM: RangeInclusive<u8> = 1..=4;
/// Shift amounts must stay below the lane bit width.
pub(crate) const SHIFT_LIMIT: u8 = 32;
/// Scalars exchanged with an external value per lane.
pub(crate) const EXTERNAL_ARGS: RangeInclusive<u8> = 0..=4;

/// Reject an operand byte outside `range`.
pub(crate) fn check_operand(
    op: Opcode,
    name: &str,
    value: u8,
    range: RangeInclusive<u8>,
) -> VmResult<u8> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(VmError::bytecode(format!(
            "{op:?}: {name} {value} outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

impl Opcode {
    /// Every opcode, indexed by its encoding.
    pub const ALL: [Opcode; 97] = [
        Self::AddF,
        Self::AddI,
        Self::SubtractF,
        Self::SubtractI,
        Self::MultiplyF,
        Self::MultiplyI,
        Self::DivideF,
        Self::DivideS,
        Self::DivideU,
        Self::RemainderF,
        Self::RemainderS,
        Self::RemainderU,
        Self::MinF,
        Self::MinS,
        Self::MaxF,
        Self::MaxS,
        Self::Pow,
        Self::Lerp,
        Self::Mix,
        Self::NegateF,
        Self::NegateI,
        Self::NotB,
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::ATan,
        Self::Sqrt,
        Self::Floor,
        Self::Ceil,
        Self::Fract,
        Self::ConvertFtoI,
        Self::ConvertStoF,
        Self::ConvertUtoF,
        Self::CompareFEQ,
        Self::CompareFNEQ,
        Self::CompareIEQ,
        Self::CompareINEQ,
        Self::CompareFLT,
        Self::CompareFLTEQ,
        Self::CompareFGT,
        Self::CompareFGTEQ,
        Self::CompareSLT,
        Self::CompareSLTEQ,
        Self::CompareSGT,
        Self::CompareSGTEQ,
        Self::CompareULT,
        Self::CompareULTEQ,
        Self::CompareUGT,
        Self::CompareUGTEQ,
        Self::AndB,
        Self::OrB,
        Self::XorB,
        Self::ShiftLeft,
        Self::ShiftRightS,
        Self::ShiftRightU,
        Self::Load,
        Self::LoadGlobal,
        Self::LoadUniform,
        Self::Store,
        Self::StoreGlobal,
        Self::LoadExtended,
        Self::LoadExtendedGlobal,
        Self::LoadExtendedUniform,
        Self::StoreExtended,
        Self::StoreExtendedGlobal,
        Self::ClampIndex,
        Self::PushImmediate,
        Self::Dup,
        Self::Pop,
        Self::Reserve,
        Self::Swizzle,
        Self::MatrixToMatrix,
        Self::MatrixMultiply,
        Self::ScalarToMatrix,
        Self::Inverse2x2,
        Self::Inverse3x3,
        Self::Inverse4x4,
        Self::Branch,
        Self::BranchIfAllFalse,
        Self::Call,
        Self::Return,
        Self::MaskPush,
        Self::MaskPop,
        Self::MaskNegate,
        Self::MaskBlend,
        Self::LoopBegin,
        Self::LoopNext,
        Self::LoopMask,
        Self::LoopEnd,
        Self::LoopBreak,
        Self::LoopContinue,
        Self::CallExternal,
        Self::ReadExternal,
        Self::WriteExternal,
        Self::LoadFragCoord,
        Self::SampleExplicit,
        Self::SampleMatrix,
    ];

    /// Decode an opcode byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Operand shape that follows this opcode in the stream.
    pub(crate) fn layout(self) -> Layout {
        use Opcode::*;
        match self {
            AddF | SubtractF | MultiplyF | DivideF | NegateF | CompareFEQ | CompareFNEQ => {
                Layout::Count { max: MAX_MATRIX }
            }
            Dup | Pop | Reserve => Layout::Count { max: u8::MAX },
            AddI | SubtractI | MultiplyI | DivideS | DivideU | RemainderF | RemainderS
            | RemainderU | MinF | MinS | MaxF | MaxS | Pow | Lerp | Mix | NegateI | NotB | Sin
            | Cos | Tan | ATan | Sqrt | Floor | Ceil | Fract | ConvertFtoI | ConvertStoF
            | ConvertUtoF | CompareIEQ | CompareINEQ | CompareFLT | CompareFLTEQ | CompareFGT
            | CompareFGTEQ | CompareSLT | CompareSLTEQ | CompareSGT | CompareSGTEQ | CompareULT
            | CompareULTEQ | CompareUGT | CompareUGTEQ => Layout::Count { max: MAX_VECTOR },
            MaskBlend => Layout::Count { max: MAX_MATRIX },
            AndB | OrB | XorB | Inverse2x2 | Inverse3x3 | Inverse4x4 | MaskPush | MaskPop
            | MaskNegate | LoopBegin | LoopNext | LoopMask | LoopEnd | LoopBreak
            | LoopContinue | LoadFragCoord => Layout::Bare,
            ShiftLeft | ShiftRightS | ShiftRightU | ClampIndex | SampleExplicit
            | SampleMatrix => Layout::Byte,
            Load | Store => Layout::Slot(SlotSpace::Local),
            LoadGlobal | StoreGlobal => Layout::Slot(SlotSpace::Global),
            LoadUniform => Layout::Slot(SlotSpace::Uniform),
            LoadExtended | StoreExtended => Layout::Extended(SlotSpace::Local),
            LoadExtendedGlobal | StoreExtendedGlobal => Layout::Extended(SlotSpace::Global),
            LoadExtendedUniform => Layout::Extended(SlotSpace::Uniform),
            PushImmediate => Layout::Imm32,
            Swizzle => Layout::Swizzle,
            MatrixToMatrix => Layout::MatrixResize,
            MatrixMultiply => Layout::MatrixMultiply,
            ScalarToMatrix => Layout::MatrixShape,
            Branch | BranchIfAllFalse => Layout::Target,
            Call => Layout::Function,
            Return => Layout::Return,
            CallExternal => Layout::ExternalCall,
            ReadExternal | WriteExternal => Layout::ExternalAccess,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bytecode/opcode.rs"]
mod tests;
