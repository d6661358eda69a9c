use super::*;

#[test]
fn push_pop_is_lifo() {
    let mut s = Stack::new();
    s.push(Value::splat_i32(1)).unwrap();
    s.push(Value::splat_i32(2)).unwrap();
    assert_eq!(s.pop().unwrap().i32(0), 2);
    assert_eq!(s.pop().unwrap().i32(0), 1);
    assert!(s.pop().is_err());
}

#[test]
fn floor_protects_the_frame() {
    let mut s = Stack::new();
    s.set_sp(3).unwrap();
    s.floor = 3;
    assert!(matches!(s.pop(), Err(VmError::Bytecode(_))));
    s.push(Value::ZERO).unwrap();
    assert_eq!(s.top(1).unwrap(), 3);
    assert!(s.top(2).is_err());
}

#[test]
fn capacity_overflow_is_an_error() {
    let mut s = Stack::new();
    s.set_sp(STACK_CAPACITY - 1).unwrap();
    s.push(Value::ZERO).unwrap();
    assert!(matches!(s.push(Value::ZERO), Err(VmError::Capacity(_))));
    assert!(s.ensure(1).is_err());
    assert!(s.set_sp(STACK_CAPACITY + 1).is_err());
}

#[test]
fn truncate_never_grows() {
    let mut s = Stack::new();
    s.set_sp(4).unwrap();
    s.truncate(10);
    assert_eq!(s.sp(), 4);
    s.truncate(1);
    assert_eq!(s.sp(), 1);
}
