pub(crate) mod external;
pub(crate) mod model;
pub(crate) mod validate;
