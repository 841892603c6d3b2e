//! Logging setup.
//!
//! Compact timestamped output with per-target levels. Library code logs under
//! the targets `segmenter`, `embed`, `sections`, `pipeline`, `storage`,
//! `retrieve`, `answer`, `llm` and `server`.
//!
//! # Configuration
//!
//! ```toml
//! [logging]
//! default = "warn"  # quiet by default
//!
//! [logging.modules]
//! pipeline = "debug"
//! retrieve = "trace"
//! ```
//!
//! # Environment Variable
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug querydoc index report.json
//! RUST_LOG=retrieve=trace,llm=debug querydoc ask --doc report "What was measured?"
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize logging with configuration.
///
/// Only the first call takes effect. `RUST_LOG` wins over `config` when set.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);

        // A host application may already own the global subscriber.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// `EnvFilter` directives for a config: `default,target=level,...`
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (module, level) in &config.modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Log an event with component context.
///
/// # Examples
/// ```ignore
/// log_event!("library", "rebuilt", "{}", document_id);
/// log_event!("library", "cache hit");
/// ```
#[macro_export]
macro_rules! log_event {
    ($handler:expr, $event:expr) => {
        tracing::info!("[{}] {}", $handler, $event)
    };
    ($handler:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $handler, $event, format!($($arg)*))
    };
}

/// Debug-only event logging.
///
/// # Examples
/// ```ignore
/// debug_event!("library", "stale", "{reason}");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($handler:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $handler, $event)
    };
    ($handler:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $handler, $event, format!($($arg)*))
    };
}
