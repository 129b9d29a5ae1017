use vmi_arch_amd64::{
    Gdtr, GpRegisters, Idtr, Msr, Register, Registers, SegmentDescriptor, SegmentRegister,
};

use crate::{FromExt, IntoExt as _, KvmDtable, KvmRegs, KvmSegment, KvmSregs, KvmVcpuState};

/// MSRs read for a full register snapshot.
pub(crate) const SNAPSHOT_MSRS: [Msr; 10] = [
    Msr::SysenterCs,
    Msr::SysenterEsp,
    Msr::SysenterEip,
    Msr::Efer,
    Msr::Star,
    Msr::Lstar,
    Msr::Cstar,
    Msr::SyscallMask,
    Msr::ShadowGsBase,
    Msr::TscAux,
];

/// Returns the indices of [`SNAPSHOT_MSRS`].
pub(crate) fn snapshot_msr_indices() -> [u32; 10] {
    SNAPSHOT_MSRS.map(Msr::index)
}

impl FromExt<&KvmSegment> for SegmentDescriptor {
    fn from_ext(value: &KvmSegment) -> Self {
        let access = u16::from(value.type_ & 0xf)
            | u16::from(value.s & 1) << 4
            | u16::from(value.dpl & 3) << 5
            | u16::from(value.present & 1) << 7
            | u16::from(value.avl & 1) << 12
            | u16::from(value.l & 1) << 13
            | u16::from(value.db & 1) << 14
            | u16::from(value.g & 1) << 15;

        Self {
            base: value.base,
            limit: value.limit,
            selector: value.selector,
            access,
        }
    }
}

impl FromExt<&KvmDtable> for Gdtr {
    fn from_ext(value: &KvmDtable) -> Self {
        Self {
            base: value.base,
            limit: value.limit.into(),
        }
    }
}

impl FromExt<&KvmDtable> for Idtr {
    fn from_ext(value: &KvmDtable) -> Self {
        Self {
            base: value.base,
            limit: value.limit.into(),
        }
    }
}

impl FromExt<&KvmRegs> for GpRegisters {
    fn from_ext(value: &KvmRegs) -> Self {
        let KvmRegs {
            rax,
            rbx,
            rcx,
            rdx,
            rsi,
            rdi,
            rsp,
            rbp,
            r8,
            r9,
            r10,
            r11,
            r12,
            r13,
            r14,
            r15,
            rip,
            rflags,
        } = *value;

        Self {
            rax,
            rbx,
            rcx,
            rdx,
            rbp,
            rsi,
            rdi,
            rsp,
            r8,
            r9,
            r10,
            r11,
            r12,
            r13,
            r14,
            r15,
            rip,
            rflags,
        }
    }
}

impl FromExt<&GpRegisters> for KvmRegs {
    fn from_ext(value: &GpRegisters) -> Self {
        let GpRegisters {
            rax,
            rbx,
            rcx,
            rdx,
            rbp,
            rsi,
            rdi,
            rsp,
            r8,
            r9,
            r10,
            r11,
            r12,
            r13,
            r14,
            r15,
            rip,
            rflags,
        } = *value;

        Self {
            rax,
            rbx,
            rcx,
            rdx,
            rsi,
            rdi,
            rsp,
            rbp,
            r8,
            r9,
            r10,
            r11,
            r12,
            r13,
            r14,
            r15,
            rip,
            rflags,
        }
    }
}

impl FromExt<&KvmVcpuState> for Registers {
    fn from_ext(value: &KvmVcpuState) -> Self {
        let KvmVcpuState { regs, sregs, .. } = value;
        let msr = |msr: Msr| value.msr(msr.index()).unwrap_or_default();

        Self {
            gp: regs.into_ext(),

            cr0: sregs.cr0,
            cr2: sregs.cr2,
            cr3: sregs.cr3,
            cr4: sregs.cr4,

            cs: (&sregs.cs).into_ext(),
            ds: (&sregs.ds).into_ext(),
            es: (&sregs.es).into_ext(),
            fs: (&sregs.fs).into_ext(),
            gs: (&sregs.gs).into_ext(),
            ss: (&sregs.ss).into_ext(),
            tr: (&sregs.tr).into_ext(),
            ldtr: (&sregs.ldt).into_ext(),

            idtr: (&sregs.idt).into_ext(),
            gdtr: (&sregs.gdt).into_ext(),

            sysenter_cs: msr(Msr::SysenterCs),
            sysenter_esp: msr(Msr::SysenterEsp),
            sysenter_eip: msr(Msr::SysenterEip),
            // Events carry EFER in the special registers only.
            efer: value.msr(Msr::Efer.index()).unwrap_or(sregs.efer),
            star: msr(Msr::Star),
            lstar: msr(Msr::Lstar),
            cstar: msr(Msr::Cstar),
            syscall_mask: msr(Msr::SyscallMask),
            shadow_gs_base: msr(Msr::ShadowGsBase),
            tsc_aux: msr(Msr::TscAux),
        }
    }
}

fn segment(sregs: &KvmSregs, register: SegmentRegister) -> &KvmSegment {
    match register {
        SegmentRegister::Cs => &sregs.cs,
        SegmentRegister::Ds => &sregs.ds,
        SegmentRegister::Es => &sregs.es,
        SegmentRegister::Fs => &sregs.fs,
        SegmentRegister::Gs => &sregs.gs,
        SegmentRegister::Ss => &sregs.ss,
        SegmentRegister::Tr => &sregs.tr,
        SegmentRegister::Ldtr => &sregs.ldt,
    }
}

fn gp_register(regs: &mut KvmRegs, register: Register) -> Option<&mut u64> {
    let value = match register {
        Register::Rax => &mut regs.rax,
        Register::Rbx => &mut regs.rbx,
        Register::Rcx => &mut regs.rcx,
        Register::Rdx => &mut regs.rdx,
        Register::Rbp => &mut regs.rbp,
        Register::Rsi => &mut regs.rsi,
        Register::Rdi => &mut regs.rdi,
        Register::Rsp => &mut regs.rsp,
        Register::R8 => &mut regs.r8,
        Register::R9 => &mut regs.r9,
        Register::R10 => &mut regs.r10,
        Register::R11 => &mut regs.r11,
        Register::R12 => &mut regs.r12,
        Register::R13 => &mut regs.r13,
        Register::R14 => &mut regs.r14,
        Register::R15 => &mut regs.r15,
        Register::Rip => &mut regs.rip,
        Register::Rflags => &mut regs.rflags,
        _ => return None,
    };

    Some(value)
}

/// Reads a single register from the native state.
///
/// MSRs are only available if they were requested when `state` was read.
pub(crate) fn read_register(state: &KvmVcpuState, register: Register) -> Option<u64> {
    let sregs = &state.sregs;

    if register.is_general_purpose() {
        let mut regs = state.regs;
        return gp_register(&mut regs, register).map(|value| *value);
    }

    let value = match register {
        Register::Cr0 => sregs.cr0,
        Register::Cr2 => sregs.cr2,
        Register::Cr3 => sregs.cr3,
        Register::Cr4 => sregs.cr4,
        Register::SegmentBase(seg) => segment(sregs, seg).base,
        Register::SegmentLimit(seg) => segment(sregs, seg).limit.into(),
        Register::SegmentSelector(seg) => segment(sregs, seg).selector.into(),
        Register::SegmentAccess(seg) => {
            SegmentDescriptor::from_ext(segment(sregs, seg)).access.into()
        }
        Register::GdtrBase => sregs.gdt.base,
        Register::GdtrLimit => sregs.gdt.limit.into(),
        Register::IdtrBase => sregs.idt.base,
        Register::IdtrLimit => sregs.idt.limit.into(),
        Register::Msr(Msr::Efer) => state.msr(Msr::Efer.index()).unwrap_or(sregs.efer),
        Register::Msr(msr) => return state.msr(msr.index()),
        _ => return None,
    };

    Some(value)
}

/// Writes a single register into the native general-purpose state.
///
/// Returns `false` if the transport cannot write the register.
pub(crate) fn write_register(regs: &mut KvmRegs, register: Register, value: u64) -> bool {
    match gp_register(regs, register) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KvmMsrEntry;

    fn state() -> KvmVcpuState {
        KvmVcpuState {
            regs: KvmRegs {
                rax: 0x1111,
                rsp: 0xffff_8000_0000_1000,
                rip: 0xffff_f800_1234_5678,
                rflags: 0x246,
                ..Default::default()
            },
            sregs: KvmSregs {
                cs: KvmSegment {
                    selector: 0x10,
                    type_: 0xb,
                    s: 1,
                    present: 1,
                    l: 1,
                    ..Default::default()
                },
                cr3: 0x1ad000,
                efer: 0xd01,
                ..Default::default()
            },
            msrs: vec![
                KvmMsrEntry {
                    index: Msr::Lstar.index(),
                    data: 0xffff_f800_0000_0000,
                },
                KvmMsrEntry {
                    index: Msr::SysenterCs.index(),
                    data: 0x10,
                },
            ],
        }
    }

    #[test]
    fn snapshot() {
        let registers = Registers::from_ext(&state());

        assert_eq!(registers.gp.rax, 0x1111);
        assert_eq!(registers.gp.rip, 0xffff_f800_1234_5678);
        assert_eq!(registers.cr3, 0x1ad000);
        assert_eq!(registers.lstar, 0xffff_f800_0000_0000);
        assert_eq!(registers.sysenter_cs, 0x10);
        assert_eq!(registers.efer, 0xd01);
        assert_eq!(registers.tsc_aux, 0);

        assert_eq!(registers.cs.selector, 0x10);
        assert!(registers.cs.present());
        assert!(registers.cs.long_mode());
        assert_eq!(registers.cs.dpl(), 0);
    }

    #[test]
    fn read_single_register() {
        let state = state();

        assert_eq!(read_register(&state, Register::Rsp), Some(0xffff_8000_0000_1000));
        assert_eq!(read_register(&state, Register::Cr3), Some(0x1ad000));
        assert_eq!(
            read_register(&state, Register::SegmentSelector(SegmentRegister::Cs)),
            Some(0x10)
        );
        assert_eq!(
            read_register(&state, Register::Msr(Msr::Lstar)),
            Some(0xffff_f800_0000_0000)
        );
        assert_eq!(read_register(&state, Register::Msr(Msr::Efer)), Some(0xd01));

        // Not part of the state.
        assert_eq!(read_register(&state, Register::Msr(Msr::Tsc)), None);
    }

    #[test]
    fn write_single_register() {
        let mut regs = state().regs;

        assert!(write_register(&mut regs, Register::Rip, 0x1000));
        assert_eq!(regs.rip, 0x1000);

        assert!(write_register(&mut regs, Register::R15, 0x2000));
        assert_eq!(regs.r15, 0x2000);

        assert!(!write_register(&mut regs, Register::Cr3, 0));
        assert!(!write_register(&mut regs, Register::Msr(Msr::Lstar), 0));
    }

    #[test]
    fn gp_registers_round_trip() {
        let registers = Registers::from_ext(&state());
        let regs = KvmRegs::from_ext(&registers.gp);

        assert_eq!(regs, state().regs);
    }
}
