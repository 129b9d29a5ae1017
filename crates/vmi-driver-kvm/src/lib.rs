//! VMI driver for KVM hypervisor.
//!
//! The driver attaches to a guest over the KVM introspection socket. The
//! socket itself is reached through [`KvmiConnector`], and domains are
//! resolved through [`VirtManager`] before the socket is opened.

mod connection;
mod convert;
mod dispatch;
mod driver;
mod error;
mod events;
mod management;
mod memory;
mod options;
mod pause;
mod registers;
mod transport;

#[cfg(test)]
mod mock;

use std::time::Duration;

use vmi_arch_amd64::{Amd64, EventMonitor, Register, Registers};
use vmi_core::{
    Gfn, MemoryAccess, Pa, Va, VcpuId, VmiDriver, VmiError, VmiInfo, VmiMappedPage, VmiWatchers,
};

pub use self::{
    error::{Error, KvmiError},
    management::{
        KvmDomainInfo, VirtDomain, VirtManager, domain_id_from_name, domain_name_from_id,
        lookup_domain, probe,
    },
    options::{KvmDomainSelector, KvmDriverOptions},
    transport::{
        KVMI_NUM_EVENTS, KvmDtable, KvmMsrEntry, KvmRegs, KvmSegment, KvmSregs, KvmVcpuState,
        KvmiAcceptCallback, KvmiConnector, KvmiDomain, KvmiEvent, KvmiEventAction,
        KvmiEventFlags, KvmiEventKind, KvmiEventReply, KvmiListener, KvmiPageAccess,
    },
};
use self::{
    connection::KvmiConnection,
    convert::{FromExt, IntoExt},
    driver::KvmDriver,
};

/// VMI driver for KVM hypervisor.
pub struct VmiKvmDriver<C>
where
    C: KvmiConnector,
{
    inner: KvmDriver<C>,
}

impl<C> VmiKvmDriver<C>
where
    C: KvmiConnector,
{
    /// Creates a new VMI driver for KVM hypervisor.
    ///
    /// Blocks until the guest connects to the introspection socket or
    /// [`KvmDriverOptions::connect_timeout`] elapses.
    pub fn new(
        connector: &C,
        manager: &impl VirtManager,
        options: &KvmDriverOptions,
    ) -> Result<Self, VmiError> {
        Ok(Self {
            inner: KvmDriver::new(connector, manager, options)?,
        })
    }

    /// Returns the size of the guest physical memory, in bytes.
    pub fn memory_size(&self) -> u64 {
        self.inner.memory_size()
    }

    /// Returns the domain ID.
    pub fn domain_id(&self) -> u64 {
        self.inner.domain_id()
    }

    /// Returns the domain name.
    pub fn domain_name(&self) -> &str {
        self.inner.domain_name()
    }

    /// Returns `true` while the guest is connected.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Reads a single register of a specific virtual CPU.
    pub fn register(&self, vcpu: VcpuId, register: Register) -> Result<u64, VmiError> {
        Ok(self.inner.register(vcpu, register)?)
    }

    /// Writes a single register of a specific virtual CPU.
    ///
    /// Only general-purpose registers, `RIP` and `RFLAGS` can be written.
    pub fn set_register(
        &self,
        vcpu: VcpuId,
        register: Register,
        value: u64,
    ) -> Result<(), VmiError> {
        Ok(self.inner.set_register(vcpu, register, value)?)
    }

    /// Waits for the guest to reconnect after the connection was lost.
    ///
    /// Event delivery, page access interception and register monitors must
    /// be set up again afterwards.
    pub fn reconnect(&self) -> Result<(), VmiError> {
        Ok(self.inner.reconnect()?)
    }
}

impl<C> VmiDriver for VmiKvmDriver<C>
where
    C: KvmiConnector,
{
    type Architecture = Amd64;

    fn info(&self) -> Result<VmiInfo, VmiError> {
        Ok(self.inner.info()?)
    }

    fn pause(&self) -> Result<(), VmiError> {
        Ok(self.inner.pause()?)
    }

    fn resume(&self) -> Result<(), VmiError> {
        Ok(self.inner.resume()?)
    }

    fn registers(&self, vcpu: VcpuId) -> Result<Registers, VmiError> {
        Ok(self.inner.registers(vcpu)?)
    }

    fn set_registers(&self, vcpu: VcpuId, registers: Registers) -> Result<(), VmiError> {
        Ok(self.inner.set_registers(vcpu, registers)?)
    }

    fn memory_access(&self, gfn: Gfn) -> Result<MemoryAccess, VmiError> {
        Ok(self.inner.memory_access(gfn)?)
    }

    fn set_memory_access(&self, gfn: Gfn, access: MemoryAccess) -> Result<(), VmiError> {
        Ok(self.inner.set_memory_access(gfn, access)?)
    }

    fn read_page(&self, gfn: Gfn) -> Result<VmiMappedPage, VmiError> {
        Ok(self.inner.read_page(gfn)?)
    }

    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError> {
        Ok(self.inner.read_physical(pa, buffer)?)
    }

    fn write_physical(&self, pa: Pa, content: &[u8]) -> Result<(), VmiError> {
        Ok(self.inner.write_physical(pa, content)?)
    }

    fn monitor_enable(&self, option: EventMonitor) -> Result<(), VmiError> {
        Ok(self.inner.monitor_enable(option)?)
    }

    fn monitor_disable(&self, option: EventMonitor) -> Result<(), VmiError> {
        Ok(self.inner.monitor_disable(option)?)
    }

    fn inject_page_fault(&self, vcpu: VcpuId, va: Va, error_code: u32) -> Result<(), VmiError> {
        Ok(self.inner.inject_page_fault(vcpu, va, error_code)?)
    }

    fn wait_for_event(
        &self,
        timeout: Duration,
        watchers: &mut dyn VmiWatchers<Amd64>,
    ) -> Result<(), VmiError> {
        Ok(self.inner.wait_for_event(timeout, watchers)?)
    }
}
