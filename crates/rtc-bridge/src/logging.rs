//! Tracing setup for host applications

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber filtered by `RUST_LOG` (default: `info`)
///
/// Returns `false` when a global subscriber was already installed, so hosts
/// that reload the scripting layer can call this more than once.
pub fn init_tracing() -> bool {
    init_tracing_with_default("info")
}

/// Like [`init_tracing`], with a custom filter used when `RUST_LOG` is unset
pub fn init_tracing_with_default(default_filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
