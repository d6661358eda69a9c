pub(crate) mod entry;
pub(crate) mod frame;
pub(crate) mod interpreter;
pub(crate) mod predicate;
