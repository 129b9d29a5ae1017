/// Error reported by the KVMI transport.
#[derive(thiserror::Error, Debug)]
pub enum KvmiError {
    /// No event arrived within the requested time.
    #[error("Timed out waiting for the introspection socket.")]
    TimedOut,

    /// The introspection socket was closed by the peer.
    #[error("The introspection socket was disconnected.")]
    Disconnected,

    /// The hypervisor rejected the request.
    #[error("The hypervisor rejected the request (errno {errno}).")]
    Rejected {
        /// The errno value reported by the hypervisor.
        errno: i32,
    },

    /// Any other I/O failure on the socket.
    #[error(transparent)]
    Io(std::io::Error),
}

impl KvmiError {
    /// Classifies an errno value returned by the transport.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::ETIMEDOUT => Self::TimedOut,
            libc::ENOTCONN | libc::EPIPE | libc::ECONNRESET => Self::Disconnected,
            errno => Self::Rejected { errno },
        }
    }
}

impl From<std::io::Error> for KvmiError {
    fn from(error: std::io::Error) -> Self {
        match error.raw_os_error() {
            Some(errno) => Self::from_errno(errno),
            None => Self::Io(error),
        }
    }
}

/// Error type for the KVM driver.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport reported an error.
    #[error(transparent)]
    Transport(#[from] KvmiError),

    /// The guest did not connect to the introspection socket in time.
    #[error("Timed out waiting for the guest to connect.")]
    ConnectionTimeout,

    /// There is no live connection to the guest.
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

    /// The register cannot be accessed through this driver.
    #[error("Unsupported register.")]
    UnsupportedRegister,

    /// The access mode cannot be expressed by this driver.
    #[error("Unsupported access mode.")]
    UnsupportedAccessMode,

    /// The domain was not found.
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    /// Operation not supported.
    #[error("Operation not supported.")]
    NotSupported,

    /// Out of bounds.
    #[error("Out of bounds.")]
    OutOfBounds,
}

impl From<Error> for vmi_core::VmiError {
    fn from(error: Error) -> Self {
        match error {
            Error::Transport(KvmiError::Disconnected) => Self::ConnectionLost,
            Error::Transport(KvmiError::TimedOut) => Self::Timeout,
            Error::Transport(KvmiError::Io(error)) => Self::Io(error),
            Error::Transport(error) => Self::Driver(Box::new(error)),
            Error::ConnectionTimeout => Self::ConnectionTimeout,
            Error::ConnectionLost => Self::ConnectionLost,
            Error::ProtocolViolation(message) => Self::ProtocolViolation(message),
            Error::UnhandledEvent(message) => Self::UnhandledEvent(message),
            Error::PartialApplyFailure(message) => Self::PartialApplyFailure(message),
            Error::UnsupportedRegister => Self::UnsupportedRegister,
            Error::UnsupportedAccessMode => Self::UnsupportedAccessMode,
            Error::DomainNotFound(name) => Self::Driver(Box::new(Error::DomainNotFound(name))),
            Error::NotSupported => Self::NotSupported,
            Error::OutOfBounds => Self::OutOfBounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use vmi_core::VmiError;

    use super::*;

    #[test]
    fn errno_classification() {
        assert!(matches!(
            KvmiError::from_errno(libc::ETIMEDOUT),
            KvmiError::TimedOut
        ));
        assert!(matches!(
            KvmiError::from_errno(libc::EPIPE),
            KvmiError::Disconnected
        ));
        assert!(matches!(
            KvmiError::from(std::io::Error::from_raw_os_error(libc::ECONNRESET)),
            KvmiError::Disconnected
        ));
        assert!(matches!(
            KvmiError::from_errno(libc::EINVAL),
            KvmiError::Rejected { errno } if errno == libc::EINVAL
        ));
    }

    #[test]
    fn disconnect_surfaces_as_connection_lost() {
        let error = VmiError::from(Error::Transport(KvmiError::Disconnected));
        assert!(matches!(error, VmiError::ConnectionLost));

        let error = VmiError::from(Error::PartialApplyFailure("vcpu 2".into()));
        assert!(matches!(error, VmiError::PartialApplyFailure(_)));
    }
}
