use crate::{Architecture, Registers, VcpuId};

/// An event delivered by the hypervisor, translated for the architecture.
#[derive(Debug, Clone, Copy)]
pub struct VmiEvent<Arch>
where
    Arch: Architecture + ?Sized,
{
    vcpu_id: VcpuId,
    sequence: u32,
    registers: Arch::Registers,
    reason: Arch::EventReason,
}

impl<Arch> VmiEvent<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Creates a new event.
    ///
    /// `sequence` is the hypervisor's correlation number for the reply to
    /// this event.
    pub fn new(
        vcpu_id: VcpuId,
        sequence: u32,
        registers: Arch::Registers,
        reason: Arch::EventReason,
    ) -> Self {
        Self {
            vcpu_id,
            sequence,
            registers,
            reason,
        }
    }

    /// Returns the virtual CPU that raised the event.
    pub fn vcpu_id(&self) -> VcpuId {
        self.vcpu_id
    }

    /// Returns the sequence number the reply is correlated with.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Returns the register snapshot taken when the event was raised.
    pub fn registers(&self) -> &Arch::Registers {
        &self.registers
    }

    /// Returns what caused the event.
    pub fn reason(&self) -> &Arch::EventReason {
        &self.reason
    }
}

bitflags::bitflags! {
    /// Special handling a watcher can ask for in [`VmiEventResponse`].
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct VmiEventResponseFlags: u8 {
        /// Deliver the intercepted interrupt to the guest.
        const REINJECT_INTERRUPT = 0b01;

        /// Emulate the faulting instruction instead of retrying it.
        const EMULATE = 0b10;
    }
}

/// What a watcher asks the driver to do before the virtual CPU continues.
///
/// The default response asks for nothing.
#[derive(Debug)]
pub struct VmiEventResponse<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Requested special handling.
    pub flags: VmiEventResponseFlags,

    /// General-purpose registers to load before continuing.
    pub registers: Option<<Arch::Registers as Registers>::GpRegisters>,
}

impl<Arch> Default for VmiEventResponse<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn default() -> Self {
        Self {
            flags: VmiEventResponseFlags::empty(),
            registers: None,
        }
    }
}

impl<Arch> VmiEventResponse<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Response asking for the interrupt to be reinjected.
    pub fn reinject_interrupt() -> Self {
        Self::default().and_reinject_interrupt()
    }

    /// Response asking for the instruction to be emulated.
    pub fn emulate() -> Self {
        Self::default().and_emulate()
    }

    /// Response asking for `registers` to be loaded.
    pub fn set_registers(registers: <Arch::Registers as Registers>::GpRegisters) -> Self {
        Self::default().and_set_registers(registers)
    }

    /// Adds [`VmiEventResponseFlags::REINJECT_INTERRUPT`].
    pub fn and_reinject_interrupt(self) -> Self {
        self.with_flags(VmiEventResponseFlags::REINJECT_INTERRUPT)
    }

    /// Adds [`VmiEventResponseFlags::EMULATE`].
    pub fn and_emulate(self) -> Self {
        self.with_flags(VmiEventResponseFlags::EMULATE)
    }

    /// Replaces the registers to load.
    pub fn and_set_registers(
        mut self,
        registers: <Arch::Registers as Registers>::GpRegisters,
    ) -> Self {
        self.registers = Some(registers);
        self
    }

    /// Returns `true` if the response asks for anything beyond continuing.
    pub fn requests_action(&self) -> bool {
        !self.flags.is_empty() || self.registers.is_some()
    }

    fn with_flags(mut self, flags: VmiEventResponseFlags) -> Self {
        self.flags |= flags;
        self
    }
}
