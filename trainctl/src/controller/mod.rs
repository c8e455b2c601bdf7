pub(crate) mod job;
pub(crate) mod node;
pub(crate) mod submit;
