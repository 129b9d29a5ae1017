//! Virtualization management.
//!
//! Domains are resolved through [`VirtManager`] before the introspection
//! socket is opened.

use crate::{Error, KvmDomainSelector};

/// A domain known to the virtualization manager.
pub trait VirtDomain {
    /// Returns the domain ID.
    fn id(&self) -> u64;

    /// Returns the domain name.
    fn name(&self) -> String;

    /// Returns the maximum memory of the domain, in KiB.
    fn max_memory_kib(&self) -> u64;
}

/// A connection to the virtualization manager.
pub trait VirtManager {
    /// The domain handle type.
    type Domain: VirtDomain;

    /// Looks up a running domain by its ID.
    fn lookup_domain_by_id(&self, id: u64) -> Option<Self::Domain>;

    /// Looks up a domain by its name.
    fn lookup_domain_by_name(&self, name: &str) -> Option<Self::Domain>;
}

/// Static information about the introspected domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvmDomainInfo {
    /// The domain ID.
    pub id: u64,

    /// The domain name.
    pub name: String,

    /// Maximum memory of the domain, in bytes.
    pub memory_size: u64,
}

impl KvmDomainInfo {
    fn from_domain(domain: &impl VirtDomain) -> Result<Self, Error> {
        let kib = domain.max_memory_kib();
        let memory_size = kib.checked_mul(1024).ok_or_else(|| {
            Error::ProtocolViolation(format!("domain reports {kib} KiB of memory"))
        })?;

        Ok(Self {
            id: domain.id(),
            name: domain.name(),
            memory_size,
        })
    }
}

/// Resolves a domain selector to its static information.
pub fn lookup_domain(
    manager: &impl VirtManager,
    selector: &KvmDomainSelector,
) -> Result<KvmDomainInfo, Error> {
    let domain = match selector {
        KvmDomainSelector::Id(id) => manager.lookup_domain_by_id(*id),
        KvmDomainSelector::Name(name) => manager.lookup_domain_by_name(name),
    };

    match domain {
        Some(domain) => KvmDomainInfo::from_domain(&domain),
        None => Err(Error::DomainNotFound(selector.to_string())),
    }
}

/// Returns the ID of the domain with the given name.
pub fn domain_id_from_name(manager: &impl VirtManager, name: &str) -> Result<u64, Error> {
    manager
        .lookup_domain_by_name(name)
        .map(|domain| domain.id())
        .ok_or_else(|| Error::DomainNotFound(name.into()))
}

/// Returns the name of the domain with the given ID.
pub fn domain_name_from_id(manager: &impl VirtManager, id: u64) -> Result<String, Error> {
    manager
        .lookup_domain_by_id(id)
        .map(|domain| domain.name())
        .ok_or_else(|| Error::DomainNotFound(id.to_string()))
}

/// Checks whether the domain can be found, by name first and then by ID.
pub fn probe(manager: &impl VirtManager, id: Option<u64>, name: Option<&str>) -> bool {
    let by_name = || name.is_some_and(|name| manager.lookup_domain_by_name(name).is_some());
    let by_id = || id.is_some_and(|id| manager.lookup_domain_by_id(id).is_some());

    by_name() || by_id()
}
