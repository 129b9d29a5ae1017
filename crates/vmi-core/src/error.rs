/// An error that can occur when working with the VMI.
#[derive(thiserror::Error, Debug)]
pub enum VmiError {
    /// An error occurred in the VMI driver.
    #[error(transparent)]
    Driver(Box<dyn std::error::Error + Send + Sync>),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No connection to the guest was established in time.
    #[error("Timed out waiting for the guest to connect.")]
    ConnectionTimeout,

    /// The connection to the guest was closed unexpectedly.
    #[error("The connection to the guest was lost.")]
    ConnectionLost,

    /// The hypervisor delivered an event that is not valid in the current
    /// state.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A delivered event did not match any registered watcher.
    #[error("Unhandled event: {0}")]
    UnhandledEvent(String),

    /// A multi-VCPU operation failed partway and was rolled back.
    #[error("Operation failed partway and was rolled back: {0}")]
    PartialApplyFailure(String),

    /// The register is not supported by the driver.
    #[error("Unsupported register.")]
    UnsupportedRegister,

    /// The access mode is not supported by the driver.
    #[error("Unsupported access mode.")]
    UnsupportedAccessMode,

    /// Operation not supported.
    #[error("Operation not supported.")]
    NotSupported,

    /// Out of bounds.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Timeout.
    #[error("Operation timed out.")]
    Timeout,
}
