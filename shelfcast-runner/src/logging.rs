//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level. Initialising twice is harmless:
//! the second call reports that a subscriber is already installed.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter from `RUST_LOG`, falling back to `level`, then to `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_tracing(level: &str, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_falls_back() {
        // Unparseable directives must not panic.
        let _ = env_filter("[[[not a filter");
        let _ = env_filter("debug,shelfcast_runner=trace");
    }

    #[test]
    fn second_init_is_rejected() {
        let _ = init_tracing("warn", LogFormat::Text);
        assert!(!init_tracing("warn", LogFormat::Json));
    }
}
