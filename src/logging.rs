//! Structured logging via `tracing`.
//!
//! The filter comes from `MAGUS_LOG` or `RUST_LOG` (e.g. `magus=debug,warn`);
//! `MAGUS_LOG_FORMAT=json` switches to JSON output for log aggregation.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "magus=info,warn";

/// Initialize the global tracing subscriber from the environment. Should be
/// called once at startup; later calls are ignored.
pub fn init_from_env() {
    let filter = std::env::var("MAGUS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let json = std::env::var("MAGUS_LOG_FORMAT").is_ok_and(|s| s.eq_ignore_ascii_case("json"));

    init(&filter, json);
}

pub fn init(filter: &str, json: bool) {
    let env_filter =
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true));
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact().with_target(true));
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
