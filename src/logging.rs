//! Tracing subscriber setup
//!
//! Log lines go to stderr so answers on stdout stay clean. `RUST_LOG`
//! overrides the level derived from `-q` / `-v` / `-vv`.

use tracing_subscriber::EnvFilter;

use crate::cli::Verbosity;

/// Filter directive for a verbosity level
pub fn default_directive(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "gridtutor=error",
        Verbosity::Normal => "gridtutor=warn",
        Verbosity::Verbose => "gridtutor=info",
        Verbosity::VeryVerbose => "gridtutor=debug",
    }
}

/// Install the global subscriber; a second call is a no-op
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(matches!(verbosity, Verbosity::VeryVerbose))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives() {
        assert_eq!(default_directive(Verbosity::Quiet), "gridtutor=error");
        assert_eq!(default_directive(Verbosity::VeryVerbose), "gridtutor=debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(Verbosity::Normal);
        init(Verbosity::Verbose);
    }
}
