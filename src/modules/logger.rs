use crate::error::AppResult;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Make sure the log directory exists
pub fn prepare_log_dir(log_dir: &Path) -> AppResult<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }
    Ok(log_dir.to_path_buf())
}

/// Initialize logger system
///
/// Console output always; a daily rolling `gateway.log` when `log_dir` is given.
pub fn init_logger(log_dir: Option<&Path>) {
    // Capture log macro logs
    let _ = tracing_log::LogTracer::init();

    // 1. Console output layer
    let console_layer = fmt::Layer::new()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    // 2. Optional file layer (disable ANSI formatting)
    let file_layer = match log_dir.map(prepare_log_dir) {
        Some(Ok(dir)) => {
            let file_appender = tracing_appender::rolling::daily(dir, "gateway.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // The writer must outlive every request; keep it until process exit
            std::mem::forget(guard);
            Some(
                fmt::Layer::new()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true),
            )
        }
        Some(Err(e)) => {
            eprintln!("Failed to initialize log directory: {}", e);
            None
        }
        None => None,
    };

    // 3. Filter layer (default to INFO and above)
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // 4. Use try_init so a second call (tests) is harmless
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    info!(
        "Logger initialized ({})",
        if log_dir.is_some() {
            "console + file"
        } else {
            "console"
        }
    );
}
