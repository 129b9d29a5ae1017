use serde::{Deserialize, Serialize};

use crate::Msr;

/// Control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlRegister {
    /// Control Register 0.
    Cr0,

    /// Control Register 3.
    Cr3,

    /// Control Register 4.
    Cr4,
}

impl ControlRegister {
    /// Returns the architectural number of the control register.
    pub fn number(self) -> u32 {
        match self {
            Self::Cr0 => 0,
            Self::Cr3 => 3,
            Self::Cr4 => 4,
        }
    }

    /// Looks up a control register by its architectural number.
    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            0 => Some(Self::Cr0),
            3 => Some(Self::Cr3),
            4 => Some(Self::Cr4),
            _ => None,
        }
    }
}

/// Segment register.
#[expect(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentRegister {
    Cs,
    Ds,
    Es,
    Fs,
    Gs,
    Ss,
    Tr,
    Ldtr,
}

/// Identifies a single guest register.
///
/// Drivers map these onto their native register structures. Not every
/// driver can read or write every register.
#[expect(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rbp,
    Rsi,
    Rdi,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Rflags,

    Cr0,
    Cr2,
    Cr3,
    Cr4,

    /// Base address of a segment register.
    SegmentBase(SegmentRegister),

    /// Limit of a segment register.
    SegmentLimit(SegmentRegister),

    /// Selector of a segment register.
    SegmentSelector(SegmentRegister),

    /// Access rights of a segment register.
    SegmentAccess(SegmentRegister),

    GdtrBase,
    GdtrLimit,
    IdtrBase,
    IdtrLimit,

    /// A model-specific register.
    Msr(Msr),
}

impl Register {
    /// Returns `true` for the general-purpose registers, `RIP` and `RFLAGS`.
    pub fn is_general_purpose(self) -> bool {
        matches!(
            self,
            Self::Rax
                | Self::Rbx
                | Self::Rcx
                | Self::Rdx
                | Self::Rbp
                | Self::Rsi
                | Self::Rdi
                | Self::Rsp
                | Self::R8
                | Self::R9
                | Self::R10
                | Self::R11
                | Self::R12
                | Self::R13
                | Self::R14
                | Self::R15
                | Self::Rip
                | Self::Rflags
        )
    }
}

impl From<ControlRegister> for Register {
    fn from(value: ControlRegister) -> Self {
        match value {
            ControlRegister::Cr0 => Self::Cr0,
            ControlRegister::Cr3 => Self::Cr3,
            ControlRegister::Cr4 => Self::Cr4,
        }
    }
}

impl From<Msr> for Register {
    fn from(value: Msr) -> Self {
        Self::Msr(value)
    }
}
