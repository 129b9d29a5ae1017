use serde::{Deserialize, Serialize};

use crate::{Gdtr, Idtr, SegmentDescriptor};

/// General-purpose registers, together with `RIP` and `RFLAGS`.
///
/// This is the part of the register state a driver can write back.
#[expect(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
}

/// A full register snapshot of a virtual CPU.
///
/// MSR fields hold zero when the driver did not capture the MSR.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// General-purpose registers.
    pub gp: GpRegisters,

    /// Control register 0.
    pub cr0: u64,
    /// Page fault linear address.
    pub cr2: u64,
    /// Page table base.
    pub cr3: u64,
    /// Control register 4.
    pub cr4: u64,

    #[expect(missing_docs)]
    pub cs: SegmentDescriptor,
    #[expect(missing_docs)]
    pub ds: SegmentDescriptor,
    #[expect(missing_docs)]
    pub es: SegmentDescriptor,
    #[expect(missing_docs)]
    pub fs: SegmentDescriptor,
    #[expect(missing_docs)]
    pub gs: SegmentDescriptor,
    #[expect(missing_docs)]
    pub ss: SegmentDescriptor,
    /// Task register.
    pub tr: SegmentDescriptor,
    /// Local descriptor table register.
    pub ldtr: SegmentDescriptor,

    /// Interrupt descriptor table register.
    pub idtr: Idtr,
    /// Global descriptor table register.
    pub gdtr: Gdtr,

    /// `IA32_SYSENTER_CS`.
    pub sysenter_cs: u64,
    /// `IA32_SYSENTER_ESP`.
    pub sysenter_esp: u64,
    /// `IA32_SYSENTER_EIP`.
    pub sysenter_eip: u64,
    /// `IA32_EFER`.
    pub efer: u64,
    /// `IA32_STAR`.
    pub star: u64,
    /// `IA32_LSTAR`.
    pub lstar: u64,
    /// `IA32_CSTAR`.
    pub cstar: u64,
    /// `IA32_FMASK`.
    pub syscall_mask: u64,
    /// `IA32_KERNEL_GS_BASE`.
    pub shadow_gs_base: u64,
    /// `IA32_TSC_AUX`.
    pub tsc_aux: u64,
}

impl vmi_core::Registers for Registers {
    type GpRegisters = GpRegisters;

    fn instruction_pointer(&self) -> u64 {
        self.gp.rip
    }

    fn set_instruction_pointer(&mut self, ip: u64) {
        self.gp.rip = ip;
    }

    fn stack_pointer(&self) -> u64 {
        self.gp.rsp
    }

    fn gp_registers(&self) -> GpRegisters {
        self.gp
    }

    fn set_gp_registers(&mut self, gp: &GpRegisters) {
        self.gp = *gp;
    }
}
