pub mod eval;
pub mod search;
pub mod session;
pub mod undo;
