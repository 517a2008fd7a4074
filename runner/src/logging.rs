use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Honours `RUST_LOG`, defaults to `info`.
///
/// Everything is written to stderr, stdout is reserved for machine readable output such as the
/// `Submitted job ...` lines that pipelines parse job ids from.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Render an error with all of its sources, `outer: inner: root`
pub fn report(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
