use std::cell::Cell;

use vmi_arch_amd64::Amd64;
use vmi_core::{Architecture as _, Gfn, MemoryAccess};

use crate::{
    Error, FromExt, IntoExt as _, KvmiDomain, KvmiEventFlags, KvmiPageAccess,
    events::{EventControl, for_each_vcpu},
};

impl FromExt<MemoryAccess> for KvmiPageAccess {
    fn from_ext(value: MemoryAccess) -> Self {
        Self::from_bits_truncate(value.bits())
    }
}

impl FromExt<KvmiPageAccess> for MemoryAccess {
    fn from_ext(value: KvmiPageAccess) -> Self {
        Self::from_bits_truncate(value.bits())
    }
}

/// Computes the native mask for a request to intercept `intercept`,
/// starting from the current native mask `current`.
///
/// Only the bits named by the request change.
pub(crate) fn native_access(
    intercept: MemoryAccess,
    current: KvmiPageAccess,
) -> Result<KvmiPageAccess, Error> {
    if intercept.is_empty() {
        Ok(KvmiPageAccess::all())
    } else if intercept == MemoryAccess::RWX {
        Ok(KvmiPageAccess::empty())
    } else if intercept == MemoryAccess::RX {
        Err(Error::UnsupportedAccessMode)
    } else {
        Ok(current - intercept.into_ext())
    }
}

/// Applies page access restrictions and arms page fault delivery the first
/// time one is requested.
pub(crate) struct MemoryAccessController {
    vcpus: u16,
    armed: Cell<bool>,
}

impl MemoryAccessController {
    pub fn new(vcpus: u16) -> Self {
        Self {
            vcpus,
            armed: Cell::new(false),
        }
    }

    pub fn reset(&self) {
        self.armed.set(false);
    }

    /// Returns the accesses currently allowed on the page.
    pub fn memory_access(&self, domain: &impl KvmiDomain, gfn: Gfn) -> Result<MemoryAccess, Error> {
        Ok(domain
            .page_access(0, Amd64::pa_from_gfn(gfn).0)?
            .into_ext())
    }

    /// Requests events for `intercept` accesses to the page.
    pub fn set_memory_access(
        &self,
        domain: &impl KvmiDomain,
        events: &EventControl,
        gfn: Gfn,
        intercept: MemoryAccess,
    ) -> Result<(), Error> {
        tracing::trace!(%gfn, %intercept, "set memory access");

        if !self.armed.get() {
            events.enable(domain, KvmiEventFlags::PF)?;
            self.armed.set(true);
            tracing::debug!("page fault delivery armed");
        }

        let gpa = Amd64::pa_from_gfn(gfn).0;

        // The mask is global; VCPU 0 stands in for all of them.
        let original = domain.page_access(0, gpa)?;
        let access = native_access(intercept, original)?;

        for_each_vcpu(
            self.vcpus,
            "set page access",
            |vcpu| domain.set_page_access(vcpu, gpa, access),
            |vcpu| domain.set_page_access(vcpu, gpa, original),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_table() -> Result<(), Error> {
        let all = KvmiPageAccess::all();

        assert_eq!(native_access(MemoryAccess::empty(), KvmiPageAccess::R)?, all);
        assert_eq!(native_access(MemoryAccess::R, all)?, KvmiPageAccess::W | KvmiPageAccess::X);
        assert_eq!(native_access(MemoryAccess::W, all)?, KvmiPageAccess::R | KvmiPageAccess::X);
        assert_eq!(native_access(MemoryAccess::X, all)?, KvmiPageAccess::R | KvmiPageAccess::W);
        assert_eq!(native_access(MemoryAccess::RW, all)?, KvmiPageAccess::X);
        assert_eq!(native_access(MemoryAccess::WX, all)?, KvmiPageAccess::R);
        assert_eq!(native_access(MemoryAccess::RWX, all)?, KvmiPageAccess::empty());

        assert!(matches!(
            native_access(MemoryAccess::RX, all),
            Err(Error::UnsupportedAccessMode)
        ));

        Ok(())
    }

    #[test]
    fn untouched_bits_are_preserved() -> Result<(), Error> {
        // Execute is already blocked; restricting writes keeps it blocked.
        let current = KvmiPageAccess::R | KvmiPageAccess::W;
        assert_eq!(native_access(MemoryAccess::W, current)?, KvmiPageAccess::R);

        // Read is already blocked; restricting execute keeps it blocked.
        let current = KvmiPageAccess::W | KvmiPageAccess::X;
        assert_eq!(native_access(MemoryAccess::X, current)?, KvmiPageAccess::W);

        Ok(())
    }
}
