//! Logging for the `mileage` binary.
//!
//! Diagnostics from every workspace crate (`mileage_cli`, `mileage_client`,
//! `mileage_core`) are filtered by the configured `log_level`, or by
//! `RUST_LOG` when it is set. They are written to stderr, plain or as JSON
//! lines with `--json-logs`, so listings and toasts on stdout stay pipeable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive covering all workspace crates at `log_level`
/// (`"warn"` → `"mileage=warn"`). A blank level falls back to `info`.
pub fn default_filter(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() {
        "mileage=info".to_string()
    } else {
        format!("mileage={}", level.to_ascii_lowercase())
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces
/// `default_filter` entirely.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_targets_workspace_crates() {
        assert_eq!(default_filter("debug"), "mileage=debug");
        assert_eq!(default_filter(" INFO "), "mileage=info");
        assert_eq!(default_filter(""), "mileage=info");
    }
}
