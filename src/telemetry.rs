//! Tracing setup shared by the binaries.

use clap::Args;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging flags.
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "JOBMATCH_LOG_JSON", global = true)]
    pub log_json: bool,
}

/// Filter directive for a verbosity level; `RUST_LOG` overrides it.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,jobmatch=info",
        1 => "info,jobmatch=debug",
        2 => "debug,jobmatch=trace",
        _ => "trace",
    }
}

/// Installs the global subscriber, writing to stderr.
pub fn init_tracing(args: &LogArgs) {
    if args.quiet {
        return;
    }
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(args.verbose)));

    if args.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
