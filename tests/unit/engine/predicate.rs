use super::*;

fn lanes(bits: &[usize]) -> Mask {
    let mut m = [false; crate::foundation::lanes::VEC_WIDTH];
    for &b in bits {
        m[b] = true;
    }
    Mask::from_lanes(m)
}

#[test]
fn base_state_enables_first_lanes() {
    let p = Predicates::new(3);
    assert_eq!(p.live(), Mask::first(3));
}

#[test]
fn if_else_splits_lanes() {
    let mut p = Predicates::new(4);
    p.mask_push(lanes(&[0, 2, 5])).unwrap();
    assert_eq!(p.live(), lanes(&[0, 2]));

    p.mask_negate().unwrap();
    assert_eq!(p.live(), lanes(&[1, 3]));

    p.mask_pop().unwrap();
    assert_eq!(p.live(), Mask::first(4));
}

#[test]
fn nested_scopes_combine() {
    let mut p = Predicates::new(8);
    p.mask_push(lanes(&[0, 1, 2, 3])).unwrap();
    p.mask_push(lanes(&[2, 3, 4])).unwrap();
    assert_eq!(p.live(), lanes(&[2, 3]));
    p.mask_negate().unwrap();
    assert_eq!(p.live(), lanes(&[0, 1]));
    assert_eq!(p.mask_blend().unwrap(), lanes(&[2, 3, 4]));
    assert_eq!(p.live(), lanes(&[0, 1, 2, 3]));
}

#[test]
fn continue_parks_lanes_until_next_iteration() {
    let mut p = Predicates::new(4);
    p.loop_begin().unwrap();
    p.mask_push(lanes(&[1])).unwrap();
    p.loop_continue().unwrap();
    p.mask_pop().unwrap();
    assert_eq!(p.live(), lanes(&[0, 2, 3]));

    p.mask_push(lanes(&[2])).unwrap();
    p.loop_break().unwrap();
    p.mask_pop().unwrap();
    assert_eq!(p.live(), lanes(&[0, 3]));

    p.loop_next().unwrap();
    assert_eq!(p.live(), lanes(&[0, 1, 3]));

    p.loop_mask(lanes(&[0, 1, 2])).unwrap();
    assert_eq!(p.live(), lanes(&[0, 1]));

    p.loop_end().unwrap();
    assert_eq!(p.live(), Mask::first(4));
}

#[test]
fn unbalanced_scopes_are_errors() {
    let mut p = Predicates::new(1);
    assert!(matches!(p.mask_pop(), Err(VmError::Bytecode(_))));
    assert!(p.mask_negate().is_err());
    assert!(p.loop_end().is_err());
    assert!(p.loop_break().is_err());
}

#[test]
fn capacity_counts_the_base_entry() {
    let mut p = Predicates::new(1);
    for _ in 0..PREDICATE_CAPACITY - 1 {
        p.mask_push(Mask::ALL).unwrap();
    }
    assert!(matches!(p.mask_push(Mask::ALL), Err(VmError::Capacity(_))));
}
