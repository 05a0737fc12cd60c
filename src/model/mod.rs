pub mod config;
pub mod query;
pub mod section;
pub mod task;

pub use config::*;
pub use query::*;
pub use section::*;
pub use task::*;
