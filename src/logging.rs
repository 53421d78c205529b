//! Diagnostic logging to stderr via `tracing`
//!
//! Level comes from `MFT_LOG` (an `EnvFilter` directive such as `debug` or
//! `mft=trace,reqwest=warn`) when set, otherwise from `-q` / `-v`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "MFT_LOG";

/// Filter directive for the given verbosity flags
pub fn default_directive(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "mft=debug,info"
    } else {
        "warn"
    }
}

/// Install the global subscriber; later calls are no-ops
pub fn init(quiet: bool, verbose: bool) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(quiet, verbose)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true, true), "error");
        assert_eq!(default_directive(false, true), "mft=debug,info");
        assert_eq!(default_directive(false, false), "warn");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(false, false);
        init(true, false);
    }
}
