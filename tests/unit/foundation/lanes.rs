use super::*;

#[test]
fn views_reinterpret_bits_without_converting() {
    let v = Value::splat_f32(1.0);
    assert_eq!(v.u32(0), 0x3f80_0000);
    assert_eq!(v.i32(3), 0x3f80_0000);

    let n = Value::splat_i32(-1);
    assert_eq!(n.u32(VEC_WIDTH - 1), u32::MAX);
    assert!(n.f32(0).is_nan());
}

#[test]
fn set_lane_touches_only_that_lane() {
    let mut v = Value::ZERO;
    v.set_f32(2, 7.5);
    assert_eq!(v.f32(2), 7.5);
    for lane in (0..VEC_WIDTH).filter(|&l| l != 2) {
        assert_eq!(v.bits(lane), 0);
    }
}

#[test]
fn first_n_lanes_mask() {
    let m = Mask::first(3);
    assert_eq!(m.active().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(Mask::first(0) == Mask::NONE);
    assert!(Mask::first(VEC_WIDTH) == Mask::ALL);
    assert!(Mask::first(VEC_WIDTH + 5) == Mask::ALL);
}

#[test]
fn mask_algebra_matches_bool_logic() {
    let a = Mask::first(4);
    let b = !Mask::first(2);
    let and = a & b;
    let or = a | b;
    for lane in 0..VEC_WIDTH {
        assert_eq!(and.lane(lane), a.lane(lane) && b.lane(lane));
        assert_eq!(or.lane(lane), a.lane(lane) || b.lane(lane));
    }
    assert!(!Mask::NONE.any());
    assert!(and.any());
}

#[test]
fn select_keeps_inactive_lanes() {
    let a = Value::splat_f32(1.0);
    let b = Value::splat_f32(2.0);
    let out = Value::select(Mask::first(1), a, b);
    assert_eq!(out.f32(0), 1.0);
    assert_eq!(out.f32(1), 2.0);
}

#[test]
fn truthy_and_canonical_booleans_agree() {
    let m = Mask::first(5);
    assert_eq!(m.to_value().truthy(), m);
    assert_eq!(m.to_value().u32(0), TRUE_BITS);

    let mut odd = Value::ZERO;
    odd.set_bits(1, 0x10);
    assert!(odd.truthy().lane(1));
    assert!(!odd.truthy().lane(0));
}

#[test]
fn lane_wise_ops_apply_per_lane() {
    let a = Value::from_i32s([1, 2, 3, 4, 5, 6, 7, 8]);
    let b = Value::splat_i32(10);
    let sum = a.zip_i32(b, i32::wrapping_add);
    assert_eq!(sum.i32(7), 18);

    let lt = a.test(Value::splat_i32(4), |x, y, l| x.i32(l) < y.i32(l));
    assert_eq!(lt.truthy(), Mask::first(3));
}
