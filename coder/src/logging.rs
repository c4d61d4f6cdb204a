//! Diagnostic tracing for coder.
//!
//! Tracing goes to stderr. The plan text, build diagnostics and final result
//! are product output and always go to stdout, whatever the filter says.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter comes from the number of
/// `-v` flags: none is `warn`, one is `coder=info`, two or more is
/// `coder=debug`.
///
/// # Example
/// ```bash
/// RUST_LOG=coder=debug coder run --target main.go
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,coder=info",
        _ => "warn,coder=debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_directives() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "warn,coder=info");
        assert_eq!(default_directive(5), "warn,coder=debug");
    }
}
