use std::{cell::RefCell, collections::HashSet, time::Duration};

use vmi_arch_amd64::{Amd64, EventMonitor, ExceptionVector, Register, Registers};
use vmi_core::{
    Architecture as _, Gfn, MemoryAccess, Pa, Va, VcpuId, VmiInfo, VmiMappedPage, VmiWatchers,
};

use crate::{
    Error, FromExt as _, KvmDomainInfo, KvmDriverOptions, KvmRegs, KvmiConnection, KvmiConnector,
    KvmiDomain, KvmiEventFlags, VirtManager,
    dispatch::EventDispatcher,
    events::{EventControl, for_each_vcpu},
    lookup_domain,
    memory::MemoryAccessController,
    pause::PauseCoordinator,
    registers::{read_register, snapshot_msr_indices, write_register},
};

/// VMI driver for KVM hypervisor.
pub struct KvmDriver<C>
where
    C: KvmiConnector,
{
    pub(crate) connection: KvmiConnection<C>,
    pub(crate) domain: KvmDomainInfo,
    pub(crate) vcpus: u16,
    pub(crate) connect_timeout: Duration,

    pub(crate) pause: PauseCoordinator,
    pub(crate) memory: MemoryAccessController,
    pub(crate) events: EventControl,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) monitors: RefCell<HashSet<EventMonitor>>,
}

impl<C> KvmDriver<C>
where
    C: KvmiConnector,
{
    pub fn new(
        connector: &C,
        manager: &impl VirtManager,
        options: &KvmDriverOptions,
    ) -> Result<Self, Error> {
        let domain = lookup_domain(manager, &options.domain)?;

        let connection =
            KvmiConnection::connect(connector, &options.socket_path, options.connect_timeout)?;

        let count = connection.with_domain(|domain| Ok(domain.vcpu_count()?))?;
        let vcpus = u16::try_from(count)
            .map_err(|_| Error::ProtocolViolation(format!("invalid vcpu count {count}")))?;

        tracing::debug!(
            id = domain.id,
            name = %domain.name,
            vcpus,
            events = options.events,
            "introspection ready"
        );

        Ok(Self {
            connection,
            domain,
            vcpus,
            connect_timeout: options.connect_timeout,
            pause: PauseCoordinator::new(options.drain_wait),
            memory: MemoryAccessController::new(vcpus),
            events: EventControl::new(vcpus),
            dispatcher: EventDispatcher::new(options.events),
            monitors: RefCell::new(HashSet::new()),
        })
    }

    pub fn info(&self) -> Result<VmiInfo, Error> {
        Ok(VmiInfo {
            page_size: Amd64::PAGE_SIZE,
            page_shift: Amd64::PAGE_SHIFT,
            max_gfn: Amd64::gfn_from_pa(Pa(self.domain.memory_size)),
            vcpus: self.vcpus,
        })
    }

    pub fn memory_size(&self) -> u64 {
        self.domain.memory_size
    }

    pub fn domain_id(&self) -> u64 {
        self.domain.id
    }

    pub fn domain_name(&self) -> &str {
        &self.domain.name
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.connection.with_domain(|domain| self.pause.pause(domain))
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.connection.with_domain(|domain| self.pause.resume(domain))
    }

    pub fn registers(&self, vcpu: VcpuId) -> Result<Registers, Error> {
        let vcpu = self.vcpu(vcpu)?;

        self.connection.with_domain(|domain| {
            let state = domain.registers(vcpu, &snapshot_msr_indices())?;
            Ok(Registers::from_ext(&state))
        })
    }

    pub fn set_registers(&self, vcpu: VcpuId, registers: Registers) -> Result<(), Error> {
        let vcpu = self.vcpu(vcpu)?;

        self.connection.with_domain(|domain| {
            Ok(domain.set_registers(vcpu, &KvmRegs::from_ext(&registers.gp))?)
        })
    }

    pub fn register(&self, vcpu: VcpuId, register: Register) -> Result<u64, Error> {
        let vcpu = self.vcpu(vcpu)?;

        let msrs = match register {
            Register::Msr(msr) => vec![msr.index()],
            _ => Vec::new(),
        };

        self.connection.with_domain(|domain| {
            let state = domain.registers(vcpu, &msrs)?;
            read_register(&state, register).ok_or(Error::UnsupportedRegister)
        })
    }

    pub fn set_register(&self, vcpu: VcpuId, register: Register, value: u64) -> Result<(), Error> {
        let vcpu = self.vcpu(vcpu)?;

        if !register.is_general_purpose() {
            return Err(Error::UnsupportedRegister);
        }

        self.connection.with_domain(|domain| {
            let mut regs = domain.registers(vcpu, &[])?.regs;

            if !write_register(&mut regs, register, value) {
                return Err(Error::UnsupportedRegister);
            }

            Ok(domain.set_registers(vcpu, &regs)?)
        })
    }

    pub fn memory_access(&self, gfn: Gfn) -> Result<MemoryAccess, Error> {
        self.connection
            .with_domain(|domain| self.memory.memory_access(domain, gfn))
    }

    pub fn set_memory_access(&self, gfn: Gfn, access: MemoryAccess) -> Result<(), Error> {
        self.connection.with_domain(|domain| {
            self.memory
                .set_memory_access(domain, &self.events, gfn, access)
        })
    }

    pub fn read_page(&self, gfn: Gfn) -> Result<VmiMappedPage, Error> {
        let mut content = vec![0u8; Amd64::PAGE_SIZE as usize];
        self.read_physical(Amd64::pa_from_gfn(gfn), &mut content)?;
        Ok(VmiMappedPage::new(content))
    }

    pub fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), Error> {
        self.check_range(pa, buffer.len())?;

        self.connection
            .with_domain(|domain| Ok(domain.read_physical(pa.0, buffer)?))
    }

    pub fn write_physical(&self, pa: Pa, content: &[u8]) -> Result<(), Error> {
        self.check_range(pa, content.len())?;

        tracing::trace!(%pa, len = content.len(), "write physical");
        self.connection
            .with_domain(|domain| Ok(domain.write_physical(pa.0, content)?))
    }

    pub fn monitor_enable(&self, option: EventMonitor) -> Result<(), Error> {
        self.monitor(option, true)
    }

    pub fn monitor_disable(&self, option: EventMonitor) -> Result<(), Error> {
        self.monitor(option, false)
    }

    pub fn inject_page_fault(&self, vcpu: VcpuId, va: Va, error_code: u32) -> Result<(), Error> {
        let vcpu = self.vcpu(vcpu)?;

        tracing::debug!(vcpu, %va, error_code, "inject page fault");
        self.connection
            .with_domain(|domain| Ok(domain.inject_page_fault(vcpu, va.0, error_code)?))
    }

    pub fn wait_for_event(
        &self,
        timeout: Duration,
        watchers: &mut dyn VmiWatchers<Amd64>,
    ) -> Result<(), Error> {
        self.connection
            .with_domain(|domain| self.dispatcher.dispatch(domain, timeout, watchers))
    }

    /// Waits for the guest to connect again after the handle was lost.
    ///
    /// Everything armed on the previous handle is forgotten.
    pub fn reconnect(&self) -> Result<(), Error> {
        self.connection.reconnect(self.connect_timeout)?;

        if self.pause.expected() > 0 {
            tracing::warn!(
                expected = self.pause.expected(),
                "discarding outstanding pause confirmations"
            );
        }

        self.pause.reset();
        self.memory.reset();
        self.events.reset();
        self.monitors.borrow_mut().clear();
        Ok(())
    }

    fn vcpu(&self, vcpu: VcpuId) -> Result<u16, Error> {
        if vcpu.0 >= self.vcpus {
            return Err(Error::OutOfBounds);
        }

        Ok(vcpu.0)
    }

    fn check_range(&self, pa: Pa, len: usize) -> Result<(), Error> {
        match pa.0.checked_add(len as u64) {
            Some(end) if end <= self.domain.memory_size => Ok(()),
            _ => Err(Error::OutOfBounds),
        }
    }

    fn monitor(&self, option: EventMonitor, enable: bool) -> Result<(), Error> {
        let flag = monitor_flag(option).ok_or(Error::NotSupported)?;

        // Breakpoints have no per-register interception to control.
        let control = |domain: &C::Domain, vcpu: u16, enable: bool| match option {
            EventMonitor::Register(cr) => domain.control_cr(vcpu, cr.number(), enable),
            EventMonitor::Msr(msr) => domain.control_msr(vcpu, msr.index(), enable),
            EventMonitor::Interrupt(_) => Ok(()),
        };

        self.connection.with_domain(|domain| {
            if enable {
                self.events.enable(domain, flag)?;

                let result = for_each_vcpu(
                    self.vcpus,
                    "enable monitor",
                    |vcpu| control(domain, vcpu, true),
                    |vcpu| control(domain, vcpu, false),
                );

                if let Err(err) = result {
                    if !self.flag_in_use(flag)
                        && let Err(err) = self.events.disable(domain, flag)
                    {
                        tracing::warn!(?option, %err, "failed to disable event delivery");
                    }

                    return Err(err);
                }

                self.monitors.borrow_mut().insert(option);
            } else {
                for_each_vcpu(
                    self.vcpus,
                    "disable monitor",
                    |vcpu| control(domain, vcpu, false),
                    |vcpu| control(domain, vcpu, true),
                )?;

                self.monitors.borrow_mut().remove(&option);

                if !self.flag_in_use(flag) {
                    self.events.disable(domain, flag)?;
                }
            }

            tracing::debug!(?option, enable, flags = ?self.events.flags(), "event monitor");
            Ok(())
        })
    }

    /// Returns `true` if any monitor still needs `flag` delivered.
    fn flag_in_use(&self, flag: KvmiEventFlags) -> bool {
        self.monitors
            .borrow()
            .iter()
            .any(|&monitor| monitor_flag(monitor) == Some(flag))
    }
}

fn monitor_flag(monitor: EventMonitor) -> Option<KvmiEventFlags> {
    match monitor {
        EventMonitor::Register(_) => Some(KvmiEventFlags::CR),
        EventMonitor::Msr(_) => Some(KvmiEventFlags::MSR),
        EventMonitor::Interrupt(ExceptionVector::Breakpoint) => Some(KvmiEventFlags::BREAKPOINT),
        EventMonitor::Interrupt(_) => None,
    }
}
