use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity flags.
///
/// Quiet wins over verbose. `RUST_LOG` overrides both unless quiet is set.
pub fn filter_directive(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "img_fit=debug,info"
    } else {
        "warn"
    }
}

/// Installs the global tracing subscriber, writing to stderr so that
/// reports on stdout stay machine-readable.
pub fn init(quiet: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let directive = filter_directive(quiet, verbose);
    let filter = if quiet {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}
