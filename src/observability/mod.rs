//! Logging setup.

use tracing_subscriber::EnvFilter;

/// Map a config log level to a tracing filter directive. Level names follow
/// the config vocabulary; `DISABLED` silences the crate entirely.
#[must_use]
pub fn filter_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "DISABLED" => "off",
        "CRITICAL" | "ERROR" => "error",
        "WARNING" | "WARN" => "warn",
        "DEBUG" => "debug",
        "TRACE" => "trace",
        // INFO and anything unrecognized
        _ => "info",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the config level when
/// set. Safe to call more than once; later calls are ignored.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(filter_directive("DISABLED"), "off");
        assert_eq!(filter_directive("critical"), "error");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("INFO"), "info");
        assert_eq!(filter_directive("nonsense"), "info");
    }
}
