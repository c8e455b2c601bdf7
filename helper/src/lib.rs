#[macro_use]
extern crate uom;

pub mod duration;
pub mod env;
pub mod init;
pub mod uom_helper;
