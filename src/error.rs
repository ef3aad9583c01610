use std::io;

use thiserror::Error;

/// Errors surfaced to callers of this crate.
///
/// Per-datagram parse failures travel through this type too, but the server
/// treats those as diagnostics: the offending packet is logged and dropped,
/// never fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// The bytes between `<` and `>` were not a decimal number.
    #[error("{digits}: message has invalid priority ({packet})")]
    InvalidPriority { digits: String, packet: String },

    #[error("{0}: unknown facility")]
    UnknownFacility(String),

    #[error("{0}: unknown severity")]
    UnknownSeverity(String),

    /// A priority filter must look like `*.*`, `user.info` or
    /// `kern,auth.notice,err`.
    #[error("{0}: invalid priority filter")]
    InvalidPriorityFilter(String),

    /// Listener bind/setup failure, returned synchronously from `listen`.
    #[error(transparent)]
    Io(#[from] io::Error),
}
