mod lower;
mod tac;

pub use lower::*;
pub use tac::*;
