//! Internal implementation details.

pub(crate) mod context;
pub(crate) mod frame;
pub(crate) mod gate;
pub(crate) mod poll;
