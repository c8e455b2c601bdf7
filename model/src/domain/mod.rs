pub mod identity;
pub mod job;
pub mod keys;
pub mod node;
pub mod resources;
