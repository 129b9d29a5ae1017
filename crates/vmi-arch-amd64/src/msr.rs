use serde::{Deserialize, Serialize};

macro_rules! msr_table {
    (
        $(
            $(#[$meta:meta])*
            $name:ident = $index:literal
        ),* $(,)?
    ) => {
        /// Model-specific registers known to the introspection layer.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Msr {
            $(
                $(#[$meta])*
                $name,
            )*
        }

        impl Msr {
            /// Every known MSR, in table order.
            pub const ALL: &'static [Msr] = &[$(Msr::$name),*];

            /// Returns the hardware index of the MSR.
            pub const fn index(self) -> u32 {
                match self {
                    $(Msr::$name => $index,)*
                }
            }

            /// Looks up an MSR by its hardware index.
            pub fn from_index(index: u32) -> Option<Self> {
                match index {
                    $($index => Some(Msr::$name),)*
                    _ => None,
                }
            }
        }
    };
}

msr_table! {
    /// Extended Feature Enable Register.
    Efer = 0xc000_0080,
    /// Legacy mode `SYSCALL` target.
    Star = 0xc000_0081,
    /// Long mode `SYSCALL` target.
    Lstar = 0xc000_0082,
    /// Compatibility mode `SYSCALL` target.
    Cstar = 0xc000_0083,
    /// `RFLAGS` mask for `SYSCALL`.
    SyscallMask = 0xc000_0084,
    /// Value swapped into `GS.base` by `SWAPGS`.
    ShadowGsBase = 0xc000_0102,
    /// Auxiliary TSC value returned by `RDTSCP`.
    TscAux = 0xc000_0103,
    /// Fixed-range MTRR for `0x00000`-`0x7ffff`.
    MtrrFix64K00000 = 0x250,
    /// Fixed-range MTRR for `0x80000`-`0x9ffff`.
    MtrrFix16K80000 = 0x258,
    /// Fixed-range MTRR for `0xa0000`-`0xbffff`.
    MtrrFix16KA0000 = 0x259,
    /// Fixed-range MTRR for `0xc0000`-`0xc7fff`.
    MtrrFix4KC0000 = 0x268,
    /// Fixed-range MTRR for `0xc8000`-`0xcffff`.
    MtrrFix4KC8000 = 0x269,
    /// Fixed-range MTRR for `0xd0000`-`0xd7fff`.
    MtrrFix4KD0000 = 0x26a,
    /// Fixed-range MTRR for `0xd8000`-`0xdffff`.
    MtrrFix4KD8000 = 0x26b,
    /// Fixed-range MTRR for `0xe0000`-`0xe7fff`.
    MtrrFix4KE0000 = 0x26c,
    /// Fixed-range MTRR for `0xe8000`-`0xeffff`.
    MtrrFix4KE8000 = 0x26d,
    /// Fixed-range MTRR for `0xf0000`-`0xf7fff`.
    MtrrFix4KF0000 = 0x26e,
    /// Fixed-range MTRR for `0xf8000`-`0xfffff`.
    MtrrFix4KF8000 = 0x26f,
    /// Default memory type for ranges not covered by an MTRR.
    MtrrDefType = 0x2ff,
    /// Machine-check bank 0 control.
    Mc0Ctl = 0x400,
    /// Machine-check bank 0 status.
    Mc0Status = 0x401,
    /// Machine-check bank 0 address.
    Mc0Addr = 0x402,
    /// Machine-check bank 0 miscellaneous information.
    Mc0Misc = 0x403,
    /// Machine-check bank 1 control.
    Mc1Ctl = 0x404,
    /// Machine-check bank 0 CMCI control.
    Mc0Ctl2 = 0x280,
    /// AMD microcode patch level.
    AmdPatchLevel = 0x8b,
    /// AMD TSC frequency ratio.
    Amd64TscRatio = 0xc000_0104,
    /// Pentium machine-check address.
    P5McAddr = 0x0,
    /// Pentium machine-check type.
    P5McType = 0x1,
    /// Time-stamp counter.
    Tsc = 0x10,
    /// Platform ID.
    PlatformId = 0x17,
    /// Processor hard power-on configuration.
    EblCrPoweron = 0x2a,
    /// Bus frequency ID.
    EbcFrequencyId = 0x2c,
    /// Feature control (VMX and SMX enablement lock).
    FeatureControl = 0x3a,
    /// `SYSENTER` code segment.
    SysenterCs = 0x174,
    /// `SYSENTER` stack pointer.
    SysenterEsp = 0x175,
    /// `SYSENTER` instruction pointer.
    SysenterEip = 0x176,
    /// Miscellaneous feature enables.
    MiscEnable = 0x1a0,
    /// First hypervisor-reserved MSR.
    Hypervisor = 0x4000_0000,
}

impl std::fmt::Display for Msr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?} ({:#x})", self.index())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn table_is_complete() {
        assert_eq!(Msr::ALL.len(), 39);

        let indices: HashSet<_> = Msr::ALL.iter().map(|msr| msr.index()).collect();
        assert_eq!(indices.len(), Msr::ALL.len());
    }

    #[test]
    fn known_indices() {
        assert_eq!(Msr::Efer.index(), 0xc000_0080);
        assert_eq!(Msr::Star.index(), 0xc000_0081);
        assert_eq!(Msr::ShadowGsBase.index(), 0xc000_0102);
        assert_eq!(Msr::MtrrDefType.index(), 0x2ff);
        assert_eq!(Msr::Mc0Ctl2.index(), 0x280);
        assert_eq!(Msr::P5McAddr.index(), 0);
        assert_eq!(Msr::SysenterEip.index(), 0x176);
        assert_eq!(Msr::Hypervisor.index(), 0x4000_0000);
    }

    #[test]
    fn from_index() {
        for &msr in Msr::ALL {
            assert_eq!(Msr::from_index(msr.index()), Some(msr));
        }

        assert_eq!(Msr::from_index(0xdead), None);
    }
}
