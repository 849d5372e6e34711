//! Subscriber setup for the binary.
//!
//! Output goes to stderr only: stdout may carry file or archive bytes.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install a compact fmt subscriber on stderr.
///
/// `RUST_LOG` wins when set and valid; otherwise `scriptshelf` logs at
/// `level` and everything else at warn. Calling this twice is a no-op.
pub fn init(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

fn default_directive(level: Level) -> String {
    format!("warn,scriptshelf={}", level.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_targets_this_crate() {
        assert_eq!(default_directive(Level::DEBUG), "warn,scriptshelf=debug");
        assert_eq!(default_directive(Level::ERROR), "warn,scriptshelf=error");
    }
}
