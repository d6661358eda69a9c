//! Column-major matrix kernels shared by the matrix instructions.
//!
//! Every kernel is written as explicit cofactor/adjugate arithmetic on `f32` so a given
//! input produces the same bits on every platform. Lane-wise wrappers apply the scalar
//! kernel to each lane of a run of consecutive registers.

use crate::foundation::lanes::{VEC_WIDTH, Value};

pub(crate) fn invert2(m: [f32; 4]) -> [f32; 4] {
    let [a, b, c, d] = m;
    let idet = 1.0 / (a * d - b * c);
    [d * idet, -b * idet, -c * idet, a * idet]
}

pub(crate) fn invert3(m: [f32; 9]) -> [f32; 9] {
    let (a11, a21, a31) = (m[0], m[1], m[2]);
    let (a12, a22, a32) = (m[3], m[4], m[5]);
    let (a13, a23, a33) = (m[6], m[7], m[8]);
    let idet = 1.0
        / (a11 * a22 * a33 + a12 * a23 * a31 + a13 * a21 * a32
            - a11 * a23 * a32
            - a12 * a21 * a33
            - a13 * a22 * a31);
    [
        (a22 * a33 - a23 * a32) * idet,
        (a23 * a31 - a21 * a33) * idet,
        (a21 * a32 - a22 * a31) * idet,
        (a13 * a32 - a12 * a33) * idet,
        (a11 * a33 - a13 * a31) * idet,
        (a12 * a31 - a11 * a32) * idet,
        (a12 * a23 - a13 * a22) * idet,
        (a13 * a21 - a11 * a23) * idet,
        (a11 * a22 - a12 * a21) * idet,
    ]
}

pub(crate) fn invert4(m: [f32; 16]) -> [f32; 16] {
    // aCR: column C, row R.
    let (a00, a01, a02, a03) = (m[0], m[1], m[2], m[3]);
    let (a10, a11, a12, a13) = (m[4], m[5], m[6], m[7]);
    let (a20, a21, a22, a23) = (m[8], m[9], m[10], m[11]);
    let (a30, a31, a32, a33) = (m[12], m[13], m[14], m[15]);

    let mut b00 = a00 * a11 - a01 * a10;
    let mut b01 = a00 * a12 - a02 * a10;
    let mut b02 = a00 * a13 - a03 * a10;
    let mut b03 = a01 * a12 - a02 * a11;
    let mut b04 = a01 * a13 - a03 * a11;
    let mut b05 = a02 * a13 - a03 * a12;
    let mut b06 = a20 * a31 - a21 * a30;
    let mut b07 = a20 * a32 - a22 * a30;
    let mut b08 = a20 * a33 - a23 * a30;
    let mut b09 = a21 * a32 - a22 * a31;
    let mut b10 = a21 * a33 - a23 * a31;
    let mut b11 = a22 * a33 - a23 * a32;

    let idet = 1.0 / (b00 * b11 - b01 * b10 + b02 * b09 + b03 * b08 - b04 * b07 + b05 * b06);

    for b in [
        &mut b00, &mut b01, &mut b02, &mut b03, &mut b04, &mut b05, &mut b06, &mut b07,
        &mut b08, &mut b09, &mut b10, &mut b11,
    ] {
        *b *= idet;
    }

    [
        a11 * b11 - a12 * b10 + a13 * b09,
        a02 * b10 - a01 * b11 - a03 * b09,
        a31 * b05 - a32 * b04 + a33 * b03,
        a22 * b04 - a21 * b05 - a23 * b03,
        a12 * b08 - a10 * b11 - a13 * b07,
        a00 * b11 - a02 * b08 + a03 * b07,
        a32 * b02 - a30 * b05 - a33 * b01,
        a20 * b05 - a22 * b02 + a23 * b01,
        a10 * b10 - a11 * b08 + a13 * b06,
        a01 * b08 - a00 * b10 - a03 * b06,
        a30 * b04 - a31 * b02 + a33 * b00,
        a21 * b02 - a20 * b04 - a23 * b00,
        a11 * b07 - a10 * b09 - a12 * b06,
        a00 * b09 - a01 * b07 + a02 * b06,
        a31 * b01 - a30 * b03 - a32 * b00,
        a20 * b03 - a21 * b01 + a22 * b00,
    ]
}

/// Apply a scalar `N`-element kernel to every lane of `regs` (which must hold `N` values).
pub(crate) fn lanewise<const N: usize>(regs: &mut [Value], kernel: impl Fn([f32; N]) -> [f32; N]) {
    debug_assert_eq!(regs.len(), N);
    for lane in 0..VEC_WIDTH {
        let mut m = [0.0f32; N];
        for (i, x) in m.iter_mut().enumerate() {
            *x = regs[i].f32(lane);
        }
        for (i, x) in kernel(m).into_iter().enumerate() {
            regs[i].set_f32(lane, x);
        }
    }
}

/// `lhs (l_cols x l_rows) * rhs (r_cols x l_cols)`, column-major, written into `out`.
///
/// `out` receives `r_cols * l_rows` values. Products accumulate from `0.0` in row-of-`rhs`
/// order.
pub(crate) fn multiply(
    lhs: &[Value],
    rhs: &[Value],
    l_cols: usize,
    l_rows: usize,
    r_cols: usize,
    out: &mut [Value],
) {
    let r_rows = l_cols;
    for lane in 0..VEC_WIDTH {
        for c in 0..r_cols {
            for r in 0..l_rows {
                let mut acc = 0.0f32;
                for j in 0..l_cols {
                    acc += lhs[j * l_rows + r].f32(lane) * rhs[c * r_rows + j].f32(lane);
                }
                out[c * l_rows + r].set_f32(lane, acc);
            }
        }
    }
}

/// Resize a column-major matrix, keeping the overlap and filling the rest from identity.
pub(crate) fn resize(
    src: &[Value],
    src_cols: usize,
    src_rows: usize,
    dst_cols: usize,
    dst_rows: usize,
) -> [Value; 16] {
    let mut tmp = [Value::ZERO; 16];
    for d in 0..4 {
        tmp[d * 4 + d] = Value::splat_f32(1.0);
    }
    for c in 0..src_cols {
        for r in 0..src_rows {
            tmp[c * 4 + r] = src[c * src_rows + r];
        }
    }
    let mut out = [Value::ZERO; 16];
    for c in 0..dst_cols {
        for r in 0..dst_rows {
            out[c * dst_rows + r] = tmp[c * 4 + r];
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
