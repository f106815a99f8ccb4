//! Log setup shared by the hub, display and sender binaries.

use clap::Args;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Verbosity and format flags common to every binary
#[derive(Args, Debug, Clone, Default)]
pub struct LogOptions {
    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    pub debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    pub quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    pub log_format: Option<String>,
}

impl LogOptions {
    pub fn level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the flag-derived level
pub fn init_logging(options: &LogOptions) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("slingshot={}", options.level())));

    let debug = options.debug;
    let fmt_layer = match options.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(debug)
            .with_file(debug)
            .with_line_number(debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(debug)
                .with_file(debug)
                .with_line_number(debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_precedence() {
        let mut options = LogOptions::default();
        assert_eq!(options.level(), "warn");

        options.quiet = true;
        assert_eq!(options.level(), "error");

        options.verbose = true;
        assert_eq!(options.level(), "info");

        options.debug = true;
        assert_eq!(options.level(), "debug");
    }
}
