use serde::{Deserialize, Serialize};

/// A cached segment register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Linear address of byte 0 of the segment.
    pub base: u64,

    /// Size of the segment.
    pub limit: u32,

    /// The selector loaded into the segment register.
    pub selector: u16,

    /// Access rights in the VMX segment access-rights layout
    /// (type, S, DPL, P, AVL, L, D/B, G).
    pub access: u16,
}

impl SegmentDescriptor {
    /// Descriptor privilege level.
    pub fn dpl(&self) -> u8 {
        ((self.access >> 5) & 0b11) as u8
    }

    /// Returns `true` if the segment is present.
    pub fn present(&self) -> bool {
        self.access & (1 << 7) != 0
    }

    /// Returns `true` for a 64-bit code segment.
    pub fn long_mode(&self) -> bool {
        self.access & (1 << 13) != 0
    }
}

/// Global Descriptor Table Register (GDTR).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gdtr {
    /// The linear address of the Global Descriptor Table (GDT).
    pub base: u64,

    /// The size of the GDT.
    pub limit: u32,
}

/// Interrupt Descriptor Table Register (IDTR).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idtr {
    /// The linear address of the Interrupt Descriptor Table (IDT).
    pub base: u64,

    /// The size of the IDT.
    pub limit: u32,
}
