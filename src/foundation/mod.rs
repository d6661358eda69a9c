pub(crate) mod error;
pub(crate) mod lanes;
pub(crate) mod limits;
pub(crate) mod math;
