pub mod install;
pub mod list;
pub mod render;
pub mod uninstall;

pub mod util;
