//! Diagnostics for the drivetag CLI.
//!
//! Everything a command prints for the user (ids, annotations, tag
//! listings) goes to stdout. What lands here is the trail behind it:
//! which remote database was found or created, the mirror's SHA-256
//! before and after each upload, token grants and chunk progress.
//!
//! On Linux the trail goes to the journal under the `drivetag` identifier
//! (`journalctl -t drivetag`). Elsewhere, or when no journal socket is
//! reachable, it goes to a daily `drivetag.log.<date>` file under the
//! local data directory, never the config directory.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the subscriber. `log_dir` overrides the file location used when
/// the journal is unavailable; `None` means `<data_local_dir>/drivetag/logs`.
///
/// `DRIVETAG_LOG` takes an `EnvFilter` directive:
/// - `DRIVETAG_LOG=trace` adds per-chunk download progress
/// - `DRIVETAG_LOG=debug` adds mirror digests, lookups and upload completion
/// - `DRIVETAG_LOG=info` database resolution and uploads (default)
/// - `DRIVETAG_LOG=warn` duplicate database names and failed closes only
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("DRIVETAG_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer.with_syslog_identifier("drivetag".to_string()))
                .try_init()?;

            tracing::debug!("drivetag logging to journald");
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drivetag")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "drivetag.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread, so it lives for the process
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::debug!(dir = %log_dir.display(), "drivetag logging to file");
    Ok(())
}
