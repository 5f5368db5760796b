//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (usually
/// `general.log_level`) is used. Returns `false` if a global subscriber was
/// already installed, which is not an error for a library embedded in a host.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let _ = init_tracing("warn");
        assert!(!init_tracing("debug"));
    }
}
