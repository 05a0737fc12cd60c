pub mod cache;
pub mod config_io;
pub mod mutate;
pub mod vault_io;
pub mod watcher;
