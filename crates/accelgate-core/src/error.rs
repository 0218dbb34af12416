//! Status taxonomy for accelerator access operations.
//!
//! Every public operation returns `Result<T, AccelError>`. The error set is
//! closed: backends map their native failures onto these conditions and the
//! dispatch layer never invents new ones. `NotSupported` is an expected
//! outcome (a backend simply lacks the capability), not a bug.

/// Errors that can occur during accelerator access operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum AccelError {
    /// A handle, token, or argument failed validation
    #[error("invalid parameter")]
    InvalidParam,

    /// The underlying resource is busy
    #[error("resource busy")]
    Busy,

    /// An internal or backend failure that has no more specific condition
    #[error("exception")]
    Exception,

    /// The requested resource does not exist
    #[error("not found")]
    NotFound,

    /// Allocation of a wrapper or backend resource failed
    #[error("no memory")]
    NoMemory,

    /// The backend does not implement the requested operation
    #[error("not supported")]
    NotSupported,

    /// No driver is available for the device
    #[error("no driver available")]
    NoDriver,

    /// The access daemon required by the backend is not running
    #[error("no accelerator daemon running")]
    NoDaemon,

    /// The caller lacks the privileges for the operation
    #[error("insufficient privileges")]
    NoAccess,

    /// Slot reconfiguration failed
    #[error("reconfiguration error")]
    ReconfError,
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, AccelError>;
