//! Structured log init for the CLI — same `tracing` + `EnvFilter` convention the
//! library uses internally, with `--verbose`/`--debug` as a convenience on top of
//! `RUST_LOG` (which still wins when set).

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool, debug: bool) {
    let directive = if debug {
        "persuader=trace,persuader_core=trace"
    } else if verbose {
        "persuader=debug,persuader_core=debug"
    } else {
        "persuader=info,persuader_core=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
