use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const SQLX_DIRECTIVE: &str = "sqlx=warn";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; `default_directive` (e.g. `"info"`) applies
/// when it is unset or invalid. sqlx statement logging is capped at `warn`
/// unless the active directives name `sqlx` themselves. Calling this twice is
/// a no-op.
pub fn init_tracing(default_directive: &str) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::registry()
        .with(build_filter(env.as_deref(), default_directive))
        .with(fmt::layer().with_target(true))
        .try_init();
}

fn build_filter(env: Option<&str>, default_directive: &str) -> EnvFilter {
    let (directives, filter) = match env.map(|e| (e, EnvFilter::try_new(e))) {
        Some((e, Ok(filter))) => (e, filter),
        _ => (default_directive, EnvFilter::new(default_directive)),
    };
    if directives.contains("sqlx") {
        return filter;
    }
    match SQLX_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
