//! Logging setup, mirroring the teacher's `tracing`/`tracing-subscriber`
//! initialization style (env-filter driven, human-readable by default).

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber. Respects `RUST_LOG` if set,
/// otherwise defaults to `info` for this crate and `warn` for dependencies.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,codesync=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Same as [`init`] but forces verbose output, used by the CLI's `-v` flag.
pub fn init_verbose() {
    let filter = EnvFilter::new("debug,codesync=trace");
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
