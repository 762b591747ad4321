//! Telemetry initialization.
//!
//! One subscriber for the whole process, installed at startup and never
//! reconfigured mid-run. Controlled by environment:
//! - `RUST_LOG` (standard `EnvFilter` syntax) overrides the default level
//!   the caller passes in;
//! - `MUSTER_LOG_FORMAT=json` switches to JSON events on stderr (for log
//!   shippers); anything else gets the human formatter.
//!
//! Diagnostics go to stderr so probe-payload mode keeps stdout clean for
//! the protocol line.

use tracing_subscriber::EnvFilter;

/// Opaque guard returned by [`init`]. Hold this in `main()` until exit so
/// the subscriber's lifetime is explicit; teardown is deterministic on
/// drop (currently nothing to flush for the stderr backends).
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber.
///
/// `default_level` is used when `RUST_LOG` is unset (e.g. `"info"`,
/// `"debug"`). Returns a guard that must be held until the program exits.
#[must_use]
pub fn init(default_level: &str) -> TelemetryGuard {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let json = std::env::var("MUSTER_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    TelemetryGuard { _private: () }
}
