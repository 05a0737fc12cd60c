use std::fs;
use std::path::{Path, PathBuf};

use crate::io::config_io;

const TASKS_FILE: &str = "tasks.md";

const TASKS_TEMPLATE: &str = "# Tasks\n\n- [ ] \n";

/// Create `tasks.md` with an empty starter task in `dir`. Refuses to
/// overwrite an existing file.
pub fn create_tasks_file(dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = dir.join(TASKS_FILE);
    if path.exists() {
        return Err(format!("{} already exists", TASKS_FILE).into());
    }
    fs::write(&path, TASKS_TEMPLATE)?;
    Ok(path)
}

pub fn cmd_init() -> Result<(), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let path = create_tasks_file(&cwd)?;
    println!("Created {}", path.display());
    if let Some(config) = config_io::config_path() {
        println!("Define profiles in {} to skip --vault.", config.display());
    }
    Ok(())
}
