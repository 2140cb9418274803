use std::{path::PathBuf, sync::Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info, trace};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{prelude::*, EnvFilter};

// Pending file writes are flushed when this is dropped.
static FILE_WRITER_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// `RUST_LOG` wins over the configured level when set.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn do_init(stdout_level: &str, file_dir: Option<PathBuf>) {
    let mut message = String::from("Logging with:");

    // stdout
    message += " stdout";

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(filter(stdout_level));

    let registry = tracing_subscriber::registry().with(stdout_layer);

    #[cfg(feature = "use-tracy")]
    let registry = {
        use tracing::metadata::LevelFilter;

        message += ", tracy";

        registry.with(tracing_tracy::TracyLayer::new().with_filter(LevelFilter::DEBUG))
    };

    let maybe_file_layer = if let Some(output_dir) = file_dir {
        message += &format!(", file (in dir {output_dir:?})");

        let file_appender = RollingFileAppender::new(Rotation::DAILY, output_dir, "lcr-bridge.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        if let Ok(mut slot) = FILE_WRITER_GUARD.lock() {
            *slot = Some(guard);
        }

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(filter(stdout_level));
        Some(file_layer)
    } else {
        None
    };

    registry.with(maybe_file_layer).init();

    debug!(message);
}

/// Initialize tracing.
///
/// Will only initialize once, so tests may call this.
pub async fn init(stdout_level: &str, file_dir: Option<PathBuf>) {
    static TRACING_IS_INITIALIZED: RwLock<bool> = RwLock::const_new(false);

    let initialized = { *TRACING_IS_INITIALIZED.read().await };

    if !initialized {
        let mut initialized = TRACING_IS_INITIALIZED.write().await;

        // To avoid race condition between the `.read()` and the
        // `.write()`.
        if *initialized {
            return;
        }

        do_init(stdout_level, file_dir);

        *initialized = true;
    }

    info!("Logging initialized");
}

/// Flush any file output not written yet.
pub fn shutdown() {
    trace!("Shutting down");

    if let Ok(mut slot) = FILE_WRITER_GUARD.lock() {
        slot.take();
    }
}
