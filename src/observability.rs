//! `tracing` shims for the builder and the index.
//!
//! Events go to the `crabdeposit` target with a `component` (`builder`, `index`) and a
//! snake_case `event` name. No subscriber is installed here.

/// Target of every event.
pub(crate) const DEPOSIT_TARGET: &str = "crabdeposit";

/// `log_info!(component = "builder", event = "deposit_file_written", rows = rows)`
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::DEPOSIT_TARGET, $($field)*)
    };
}

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::DEPOSIT_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::DEPOSIT_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_info;
pub(crate) use log_warn;
