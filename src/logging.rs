use tracing_subscriber::EnvFilter;

/// Filter used when the configured one does not parse.
const FALLBACK_FILTER: &str = "info";

/// Installs the global subscriber. Output goes to stderr; stdout is reserved
/// for protocol responses.
pub fn init(default_filter: &str) {
    let (filter, rejected) = build_filter(default_filter);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init();
    if let Some(e) = rejected {
        tracing::warn!(
            filter = %default_filter,
            error = %e,
            fallback = FALLBACK_FILTER,
            "invalid log filter ignored"
        );
    }
}

/// Parses `directives`, falling back to `info`. The parse error is handed
/// back so it can be logged once the subscriber exists.
fn build_filter(directives: &str) -> (EnvFilter, Option<String>) {
    match EnvFilter::try_new(directives) {
        Ok(f) => (f, None),
        Err(e) => (EnvFilter::new(FALLBACK_FILTER), Some(e.to_string())),
    }
}
