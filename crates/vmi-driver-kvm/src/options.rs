use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Identifies the domain to introspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvmDomainSelector {
    /// Select the domain by its ID.
    Id(u64),

    /// Select the domain by its name.
    Name(String),
}

impl Default for KvmDomainSelector {
    fn default() -> Self {
        Self::Id(0)
    }
}

impl std::fmt::Display for KvmDomainSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Options for the KVM driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvmDriverOptions {
    /// The domain to introspect.
    pub domain: KvmDomainSelector,

    /// Path of the introspection socket.
    pub socket_path: PathBuf,

    /// Whether events should be delivered at all.
    pub events: bool,

    /// How long to wait for the guest to connect.
    pub connect_timeout: Duration,

    /// Length of a single wait while draining pause confirmations.
    pub drain_wait: Duration,
}

impl Default for KvmDriverOptions {
    fn default() -> Self {
        Self {
            domain: KvmDomainSelector::default(),
            socket_path: PathBuf::from("/tmp/introspector"),
            events: true,
            connect_timeout: Duration::from_secs(10),
            drain_wait: Duration::from_secs(1),
        }
    }
}

impl KvmDriverOptions {
    /// Creates options for the given domain.
    pub fn new(domain: KvmDomainSelector) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }

    /// Sets the introspection socket path.
    pub fn with_socket_path(self, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..self
        }
    }

    /// Enables or disables event delivery.
    pub fn with_events(self, events: bool) -> Self {
        Self { events, ..self }
    }

    /// Sets the connection timeout.
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Sets the wait slice used while draining pause confirmations.
    pub fn with_drain_wait(self, drain_wait: Duration) -> Self {
        Self { drain_wait, ..self }
    }
}
