//! Logging setup.
//!
//! `RUST_LOG` takes precedence over the verbosity flag when set.

use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::{ProviderError, Result};

/// Builds the filter: `RUST_LOG` if set, otherwise `debug` or `info`.
fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn try_init_logging(verbose: bool, json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ProviderError::internal(format!("failed to initialize logging: {e}")))
}

/// Installs the global subscriber, ignoring an already-installed one.
pub fn init_logging(verbose: bool, json: bool) {
    // A second call keeps the first subscriber.
    if let Err(e) = try_init_logging(verbose, json) {
        debug!("Keeping the existing subscriber: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_logging(true, false);
        tokio_test::assert_err!(try_init_logging(false, true));
        // Falls back to the installed subscriber instead of failing.
        init_logging(false, true);
    }
}
