use std::time::Duration;

use crate::{
    Architecture, Gfn, MemoryAccess, Pa, Va, VcpuId, VmiError, VmiInfo, VmiMappedPage, VmiWatchers,
};

/// A trait for implementing a VMI driver.
pub trait VmiDriver {
    /// The architecture supported by the driver.
    type Architecture: Architecture + ?Sized;

    /// Retrieves information about the virtual machine.
    fn info(&self) -> Result<VmiInfo, VmiError>;

    /// Pauses the virtual machine.
    fn pause(&self) -> Result<(), VmiError>;

    /// Resumes the virtual machine.
    fn resume(&self) -> Result<(), VmiError>;

    /// Retrieves the registers of a specific virtual CPU.
    fn registers(
        &self,
        vcpu: VcpuId,
    ) -> Result<<Self::Architecture as Architecture>::Registers, VmiError>;

    /// Sets the registers of a specific virtual CPU.
    fn set_registers(
        &self,
        vcpu: VcpuId,
        registers: <Self::Architecture as Architecture>::Registers,
    ) -> Result<(), VmiError>;

    /// Retrieves the memory access permissions for a specific GFN.
    ///
    /// The returned mask lists the accesses that are currently allowed.
    fn memory_access(&self, gfn: Gfn) -> Result<MemoryAccess, VmiError>;

    /// Requests events for the given accesses to a specific GFN.
    ///
    /// `access` names the accesses to be intercepted. An empty mask removes
    /// any interception from the page.
    fn set_memory_access(&self, gfn: Gfn, access: MemoryAccess) -> Result<(), VmiError>;

    /// Reads a page of memory from the virtual machine.
    fn read_page(&self, gfn: Gfn) -> Result<VmiMappedPage, VmiError>;

    /// Reads guest physical memory into `buffer`.
    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError>;

    /// Writes `content` to guest physical memory.
    fn write_physical(&self, pa: Pa, content: &[u8]) -> Result<(), VmiError>;

    /// Enables monitoring of specific events.
    fn monitor_enable(
        &self,
        option: <Self::Architecture as Architecture>::EventMonitor,
    ) -> Result<(), VmiError>;

    /// Disables monitoring of specific events.
    fn monitor_disable(
        &self,
        option: <Self::Architecture as Architecture>::EventMonitor,
    ) -> Result<(), VmiError>;

    /// Injects a page fault for `va` into a specific virtual CPU.
    fn inject_page_fault(&self, vcpu: VcpuId, va: Va, error_code: u32) -> Result<(), VmiError>;

    /// Waits for an event to occur and dispatches it to the matching
    /// watcher.
    ///
    /// Returns `Ok(())` when no event arrived within `timeout`.
    fn wait_for_event(
        &self,
        timeout: Duration,
        watchers: &mut dyn VmiWatchers<Self::Architecture>,
    ) -> Result<(), VmiError>;
}
