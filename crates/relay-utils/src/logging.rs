//! Logging and tracing utilities

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging options collected from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// Number of `-v` flags
    pub verbosity: u8,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl LogOptions {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins over the verbosity flags. Logs go to stderr so that the
/// lifecycle report on stdout stays readable.
pub fn init_tracing(options: LogOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directive()));

    let registry = tracing_subscriber::registry().with(filter);

    if options.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(LogOptions::default().default_directive(), "info");
        assert_eq!(
            LogOptions { verbosity: 1, json: false }.default_directive(),
            "debug"
        );
        assert_eq!(
            LogOptions { verbosity: 4, json: true }.default_directive(),
            "trace"
        );
    }
}
