//! Custom error types for the crate.
//!
//! `MtsError` is the single error type returned by every fallible operation in
//! the library. It is built with `thiserror` and is `Clone`, because one
//! failure produced by a coalesced device poll is handed to every waiter.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: unknown family or amplifier identifiers, contradictory
//!   transport selection, missing amplifiers. Fatal, never retried.
//! - **`AlreadyConfigured`**: a second attempt to set the amplifier selection of
//!   a session.
//! - **`Rejected`**: the requested loadpoint lies outside the capability
//!   envelope. Carries a [`Rejection`] code callers can branch on.
//! - **`Protocol`**: a reply that could not be interpreted (too few lines,
//!   unmatched firmware identification, unexpected token).
//! - **`Timeout`**: no acknowledgement arrived in time. The channel stays usable.
//! - **`InvalidState`**: the operation does not fit the session state, such as
//!   starting a dosage before its energy was set.
//! - **`Internal`**: catalog tables violate their own invariants.
//! - **`Io`**: transport I/O failure.
//! - **`Step`**: context wrapper naming which command of a composed operation
//!   failed.

use std::{fmt, io, sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, MtsError>;

/// Reason a loadpoint was refused by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    /// An enabled voltage is outside its phase range.
    VoltageOutOfRange,
    /// An enabled current is outside its phase range.
    CurrentOutOfRange,
    /// An enabled channel angle is outside `[0, 360)`.
    AngleOutOfRange,
    /// Wrong frequency mode or value outside the envelope.
    FrequencyOutOfRange,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::VoltageOutOfRange => "voltage out of range",
            Rejection::CurrentOutOfRange => "current out of range",
            Rejection::AngleOutOfRange => "angle out of range",
            Rejection::FrequencyOutOfRange => "frequency out of range",
        };
        f.write_str(text)
    }
}

/// Every failure the library reports. See the module docs for the hierarchy.
#[derive(Error, Debug, Clone)]
#[allow(missing_docs)]
pub enum MtsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Device is already configured")]
    AlreadyConfigured,

    #[error("Loadpoint rejected: {0}")]
    Rejected(Rejection),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout after {timeout:?} waiting for reply to '{command}'")]
    Timeout { command: String, timeout: Duration },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("Step {index} ('{command}') failed: {source}")]
    Step {
        index: usize,
        command: String,
        #[source]
        source: Box<MtsError>,
    },
}

impl MtsError {
    /// The underlying failure with any `Step` context removed.
    pub fn root(&self) -> &MtsError {
        match self {
            MtsError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for failures where the device never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), MtsError::Timeout { .. })
    }
}

impl From<io::Error> for MtsError {
    fn from(err: io::Error) -> Self {
        MtsError::Io(Arc::new(err))
    }
}

impl From<Rejection> for MtsError {
    fn from(rejection: Rejection) -> Self {
        MtsError::Rejected(rejection)
    }
}
