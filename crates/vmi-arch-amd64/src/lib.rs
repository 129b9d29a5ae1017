//! AMD64 architecture definitions.

mod descriptor;
mod event;
mod interrupt;
mod msr;
mod register;
mod registers;

use vmi_core::Architecture;

pub use self::{
    descriptor::{Gdtr, Idtr, SegmentDescriptor},
    event::{EventInterrupt, EventMemoryAccess, EventMonitor, EventReason},
    interrupt::ExceptionVector,
    msr::Msr,
    register::{ControlRegister, Register, SegmentRegister},
    registers::{GpRegisters, Registers},
};

/// AMD64 architecture.
#[derive(Debug, Clone, Copy)]
pub struct Amd64;

impl Architecture for Amd64 {
    const PAGE_SIZE: u64 = 0x1000;
    const PAGE_SHIFT: u64 = 12;

    type Registers = Registers;
    type InterruptVector = ExceptionVector;

    type EventMonitor = EventMonitor;
    type EventReason = EventReason;
}

#[cfg(test)]
mod tests {
    use vmi_core::{Gfn, Pa};

    use super::*;

    #[test]
    fn page_arithmetic() {
        let pa = Pa(0x1234_5678);
        assert_eq!(Amd64::gfn_from_pa(pa), Gfn(0x12345));
        assert_eq!(Amd64::pa_offset(pa), 0x678);
        assert_eq!(Amd64::pa_from_gfn(Gfn(0x12345)), Pa(0x1234_5000));
    }
}
