use serde::{Deserialize, Serialize};
use vmi_core::{Gfn, MemoryAccess, Pa, Va};

use crate::{ControlRegister, ExceptionVector, Msr};

/// An intercepted access to a guest page.
#[derive(Debug, Clone, Copy)]
pub struct EventMemoryAccess {
    /// Faulting guest physical address.
    pub pa: Pa,

    /// Faulting guest virtual address.
    pub va: Va,

    /// The access that faulted. May combine several bits.
    pub access: MemoryAccess,
}

/// An intercepted interrupt or exception.
#[derive(Debug, Clone, Copy)]
pub struct EventInterrupt {
    /// Frame holding the instruction that raised the interrupt.
    pub gfn: Gfn,

    /// Instruction pointer at the time of the interrupt.
    pub va: Va,

    #[expect(missing_docs)]
    pub vector: ExceptionVector,
}

/// Why a virtual CPU stopped and reported to the driver.
#[derive(Debug, Clone, Copy)]
pub enum EventReason {
    /// A page access violated the page's access mask.
    MemoryAccess(EventMemoryAccess),

    /// An intercepted interrupt was raised.
    Interrupt(EventInterrupt),
}

impl EventReason {
    /// Returns the memory access, if this is a memory event.
    pub fn as_memory_access(&self) -> Option<&EventMemoryAccess> {
        match self {
            Self::MemoryAccess(access) => Some(access),
            Self::Interrupt(_) => None,
        }
    }

    /// Returns the interrupt, if this is an interrupt event.
    pub fn as_interrupt(&self) -> Option<&EventInterrupt> {
        match self {
            Self::Interrupt(interrupt) => Some(interrupt),
            Self::MemoryAccess(_) => None,
        }
    }
}

/// Hardware event class the driver can be asked to intercept.
///
/// Page accesses are not listed here: they are intercepted per page through
/// [`VmiDriver::set_memory_access`].
///
/// [`VmiDriver::set_memory_access`]: vmi_core::VmiDriver::set_memory_access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventMonitor {
    /// Writes to a control register.
    Register(ControlRegister),

    /// Writes to a model-specific register.
    Msr(Msr),

    /// An exception vector. Only `#BP` is supported.
    Interrupt(ExceptionVector),
}
