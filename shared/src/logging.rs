//! Tracing setup and contextual logging helpers
//!
//! Both binaries log through `tracing`. The subscriber is a plain `fmt` layer
//! with an `EnvFilter`; `RUST_LOG` always wins over the built-in filter.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{error, info, warn};

/// Binary that is emitting logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Provisioner,
    Tester,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Provisioner => write!(f, "provisioner"),
            Component::Tester => write!(f, "tester"),
        }
    }
}

/// Filter directives used when `RUST_LOG` is not set
pub fn default_filter(component: Component, verbose: bool) -> String {
    if verbose {
        format!("{component}=debug,azure=debug,shared=debug,reqwest=warn,info")
    } else {
        format!("{component}=info,azure=info,shared=info,warn")
    }
}

/// Install the global subscriber
pub fn init_tracing(component: Component, verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(component, verbose)));

    fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

pub fn log_step(step: &str, details: &str) {
    info!(timestamp = format_timestamp(), "📋 {}: {}", step, details);
}

pub fn log_success(message: &str) {
    info!(timestamp = format_timestamp(), "✅ {}", message);
}

pub fn log_warning(context: &str, problem: &dyn fmt::Display) {
    warn!(timestamp = format_timestamp(), "⚠️  {}: {}", context, problem);
}

pub fn log_error(context: &str, error: &dyn fmt::Display) {
    error!(
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}
