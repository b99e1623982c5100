//! Process-wide default options.
//!
//! Every call merges its options over the client defaults, then over these.
//! They are meant to be set once at startup; later changes only affect calls
//! that start afterwards.

use std::sync::{LazyLock, PoisonError, RwLock};

use sluice_core::Options;

static DEFAULTS: LazyLock<RwLock<Options>> = LazyLock::new(RwLock::default);

/// Current process-wide defaults.
#[must_use]
pub fn default_options() -> Options {
    DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the process-wide defaults.
///
/// # Example
///
/// ```
/// use sluice::{Options, default_options, set_default_options};
///
/// set_default_options(Options::new().user_agent("my-app/1.0"));
/// assert_eq!(default_options().user_agent.as_deref(), Some("my-app/1.0"));
/// ```
pub fn set_default_options(options: Options) {
    *DEFAULTS.write().unwrap_or_else(PoisonError::into_inner) = options;
}
