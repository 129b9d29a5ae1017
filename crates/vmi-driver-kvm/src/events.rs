use std::cell::Cell;

use crate::{Error, KvmiDomain, KvmiError, KvmiEventFlags};

/// Applies `apply` to VCPUs `0..vcpus` in order.
///
/// If VCPU `k` fails, `rollback` is called for VCPUs `0..=k` and the call
/// fails with [`Error::PartialApplyFailure`]. Rollback failures are only
/// logged.
pub(crate) fn for_each_vcpu(
    vcpus: u16,
    what: &str,
    mut apply: impl FnMut(u16) -> Result<(), KvmiError>,
    mut rollback: impl FnMut(u16) -> Result<(), KvmiError>,
) -> Result<(), Error> {
    for vcpu in 0..vcpus {
        let err = match apply(vcpu) {
            Ok(()) => continue,
            Err(err) => err,
        };

        tracing::warn!(vcpu, %err, what, "rolling back");

        for done in 0..=vcpu {
            if let Err(err) = rollback(done) {
                tracing::warn!(vcpu = done, %err, what, "rollback failed");
            }
        }

        return Err(Error::PartialApplyFailure(format!("{what}: vcpu {vcpu}: {err}")));
    }

    Ok(())
}

/// Tracks the event delivery mask shared by every VCPU.
///
/// The transport replaces the whole mask on every call, so enabling one
/// event class must carry the others along.
pub(crate) struct EventControl {
    vcpus: u16,
    flags: Cell<KvmiEventFlags>,
}

impl EventControl {
    pub fn new(vcpus: u16) -> Self {
        Self {
            vcpus,
            flags: Cell::new(KvmiEventFlags::empty()),
        }
    }

    pub fn flags(&self) -> KvmiEventFlags {
        self.flags.get()
    }

    pub fn enable(&self, domain: &impl KvmiDomain, flags: KvmiEventFlags) -> Result<(), Error> {
        self.apply(domain, self.flags.get() | flags)
    }

    pub fn disable(&self, domain: &impl KvmiDomain, flags: KvmiEventFlags) -> Result<(), Error> {
        self.apply(domain, self.flags.get() - flags)
    }

    /// Forgets the tracked mask after the handle was replaced.
    pub fn reset(&self) {
        self.flags.set(KvmiEventFlags::empty());
    }

    fn apply(&self, domain: &impl KvmiDomain, flags: KvmiEventFlags) -> Result<(), Error> {
        let previous = self.flags.get();
        if flags == previous {
            return Ok(());
        }

        tracing::trace!(?previous, ?flags, "control events");

        for_each_vcpu(
            self.vcpus,
            "control events",
            |vcpu| domain.control_events(vcpu, flags),
            |vcpu| domain.control_events(vcpu, previous),
        )?;

        self.flags.set(flags);
        Ok(())
    }
}
