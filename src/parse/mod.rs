pub mod query_parser;
pub mod task_parser;

pub use query_parser::{parse_blocks, parse_inline};
pub use task_parser::{parse_task_line, parse_tasks};
