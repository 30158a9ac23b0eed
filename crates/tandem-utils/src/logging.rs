//! Logging and observability infrastructure for tandem.
//!
//! Structured logging via tracing, initialized once at CLI startup.
//! Pipeline progress intended for the caller flows through the event
//! stream, not through log output; logs carry operator-facing detail
//! (provider latencies, retry decisions, fallback branches).

use std::io::IsTerminal;
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Check if colored output should be used.
///
/// Returns true only if:
/// - stderr is a terminal (TTY)
/// - NO_COLOR environment variable is not set
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the tracing subscriber.
///
/// Respects `RUST_LOG` when set; otherwise `tandem=debug,info` in verbose
/// mode and `tandem=info,warn` by default. Events go to stderr so the
/// rendered event stream on stdout stays clean.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("tandem=debug,info")
            } else {
                EnvFilter::try_new("tandem=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .with_ansi(use_color())
                .compact(),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent_failure() {
        // First init may succeed or fail depending on test ordering; the
        // second must fail because a global subscriber is already set.
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}
