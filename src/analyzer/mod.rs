mod check;
mod symbol_table;
mod ty;

pub use check::*;
pub use symbol_table::*;
pub use ty::*;
