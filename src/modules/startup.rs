// Startup diagnostics: where we run and what we will serve

use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

pub fn log_environment(static_dir: &Path) {
    match std::env::current_dir() {
        Ok(cwd) => info!("Working directory: {}", cwd.display()),
        Err(e) => warn!("Failed to resolve working directory: {}", e),
    }

    match list_files(static_dir) {
        Ok(files) => info!("Files in {}: {:?}", static_dir.display(), files),
        Err(e) => warn!("Failed to list {}: {}", static_dir.display(), e),
    }
}

/// Sorted, non-hidden entry names of `dir`
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
