//! Miscellaneous test code for Brook.

// Standard lints
#![warn(missing_docs)]
#![allow(clippy::try_err)]
#![deny(clippy::await_holding_lock)]
#![forbid(unsafe_code)]

use std::sync::Once;

use once_cell::sync::Lazy;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// A multi-threaded Tokio runtime that can be shared between tests.
///
/// Use this runtime for tests that drive background tasks spawned outside
/// an async test body, for example when a synchronous property test needs
/// to block on a future. A shared runtime should not be used in tests that
/// pause and resume the Tokio timer.
pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime")
});

static INIT: Once = Once::new();

/// Initialize globals for tests such as the tracing subscriber and panic /
/// error reporting hooks
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_target(false);
        // Use the RUST_LOG env var, or by default:
        //  - warn for most tests, and
        //  - hide expected warn logs from the verification pipeline
        let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new("warn")
                .expect("hard-coded filter is valid")
                .add_directive(
                    "brook_consensus=error"
                        .parse()
                        .expect("hard-coded directive is valid"),
                )
        });

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .init();

        // Install the panic and error report hooks; a test harness that
        // already installed its own keeps it.
        let _ = color_eyre::install();
    });
}
