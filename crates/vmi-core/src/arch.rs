//! Architecture abstraction.

use std::{fmt::Debug, hash::Hash};

use crate::{Gfn, Pa};

/// Page geometry and event types of a CPU architecture.
///
/// Drivers translate their native register and event structures into the
/// types named here. Watchers are written against these types.
pub trait Architecture {
    /// Size of a page, in bytes.
    const PAGE_SIZE: u64;

    /// `log2(PAGE_SIZE)`.
    const PAGE_SHIFT: u64;

    /// Register snapshot delivered with every event.
    type Registers: Registers;

    /// Interrupt vector a watcher can be registered for.
    type InterruptVector: Debug + Clone + Copy + PartialEq + Eq + Hash;

    /// Hardware event class that can be monitored.
    type EventMonitor: Debug + Clone + Copy;

    /// What caused an event.
    type EventReason: Debug + Clone + Copy;

    /// Returns the frame containing `pa`.
    fn gfn_from_pa(pa: Pa) -> Gfn {
        Gfn(pa.0 >> Self::PAGE_SHIFT)
    }

    /// Returns the first address of `gfn`.
    fn pa_from_gfn(gfn: Gfn) -> Pa {
        Pa(gfn.0 << Self::PAGE_SHIFT)
    }

    /// Returns the offset of `pa` within its page.
    fn pa_offset(pa: Pa) -> u64 {
        pa.0 & (Self::PAGE_SIZE - 1)
    }
}

/// Register snapshot of a virtual CPU.
pub trait Registers
where
    Self: Debug + Default + Clone + Copy,
{
    /// The writable subset of the snapshot.
    type GpRegisters: Debug + Default + Clone + Copy;

    /// Returns the instruction pointer.
    fn instruction_pointer(&self) -> u64;

    /// Sets the instruction pointer.
    fn set_instruction_pointer(&mut self, ip: u64);

    /// Returns the stack pointer.
    fn stack_pointer(&self) -> u64;

    /// Returns the writable subset of the snapshot.
    fn gp_registers(&self) -> Self::GpRegisters;

    /// Replaces the writable subset of the snapshot.
    fn set_gp_registers(&mut self, gp: &Self::GpRegisters);
}
