// src/macros.rs
//
// Crate-internal logging.
//
// With `logging`, every level goes to `tracing`. Without it, errors and
// warnings (lost links, dropped sessions) still reach stderr and the
// chattier levels compile to nothing.

#![allow(unused_macros)]

#[cfg(feature = "logging")]
mod enabled {
    macro_rules! log_error {
        ($($arg:tt)*) => { tracing::error!($($arg)*) };
    }
    macro_rules! log_warn {
        ($($arg:tt)*) => { tracing::warn!($($arg)*) };
    }
    macro_rules! log_info {
        ($($arg:tt)*) => { tracing::info!($($arg)*) };
    }
    macro_rules! log_debug {
        ($($arg:tt)*) => { tracing::debug!($($arg)*) };
    }

    pub(crate) use {log_debug, log_error, log_info, log_warn};
}

#[cfg(not(feature = "logging"))]
mod enabled {
    macro_rules! log_error {
        ($($arg:tt)*) => { eprintln!("[mom-pubsub] error: {}", format_args!($($arg)*)) };
    }
    macro_rules! log_warn {
        ($($arg:tt)*) => { eprintln!("[mom-pubsub] warn: {}", format_args!($($arg)*)) };
    }
    macro_rules! log_info {
        ($($arg:tt)*) => {};
    }
    macro_rules! log_debug {
        ($($arg:tt)*) => {};
    }

    pub(crate) use {log_debug, log_error, log_info, log_warn};
}

pub(crate) use enabled::{log_debug, log_error, log_info, log_warn};

/// Install a `tracing` subscriber driven by `RUST_LOG`.
///
/// Safe to call repeatedly; only the first call in a process has an effect,
/// and an already installed global subscriber is left untouched.
#[cfg(feature = "logging")]
pub fn init_logger() {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    });
}

/// No-op without the `logging` feature.
#[cfg(not(feature = "logging"))]
pub fn init_logger() {}
