use serde::{Deserialize, Serialize};

/// Exception vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionVector(pub u8);

#[expect(non_upper_case_globals)]
impl ExceptionVector {
    /// Debug (#DB).
    pub const DebugException: Self = Self(1);

    /// Breakpoint (#BP), raised by `INT3`.
    pub const Breakpoint: Self = Self(3);

    /// Invalid Opcode (#UD).
    pub const InvalidOpcode: Self = Self(6);

    /// General Protection Fault (#GP).
    pub const GeneralProtectionFault: Self = Self(13);

    /// Page Fault (#PF).
    pub const PageFault: Self = Self(14);
}

impl std::fmt::Display for ExceptionVector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Self::DebugException => write!(f, "#DB"),
            Self::Breakpoint => write!(f, "#BP"),
            Self::InvalidOpcode => write!(f, "#UD"),
            Self::GeneralProtectionFault => write!(f, "#GP"),
            Self::PageFault => write!(f, "#PF"),
            Self(vector) => write!(f, "vector {vector}"),
        }
    }
}
