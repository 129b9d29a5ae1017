use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Memory access flags.
    ///
    /// Used both to describe an observed access (the access that triggered
    /// a memory event) and to describe which accesses a watcher or a
    /// [`set_memory_access`] request is interested in.
    ///
    /// [`set_memory_access`]: crate::VmiDriver::set_memory_access
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MemoryAccess: u8 {
        /// Read access.
        const R = 0b00000001;

        /// Write access.
        const W = 0b00000010;

        /// Execute access.
        const X = 0b00000100;

        /// Read and write access.
        const RW = Self::R.bits() | Self::W.bits();

        /// Write and execute access.
        const WX = Self::W.bits() | Self::X.bits();

        /// Read and execute access.
        const RX = Self::R.bits() | Self::X.bits();

        /// Read, write and execute access.
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
    }
}

impl std::fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut result = ['-'; 3];

        if self.contains(MemoryAccess::R) {
            result[0] = 'r';
        }
        if self.contains(MemoryAccess::W) {
            result[1] = 'w';
        }
        if self.contains(MemoryAccess::X) {
            result[2] = 'x';
        }

        result.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(MemoryAccess::empty().to_string(), "---");
        assert_eq!(MemoryAccess::RW.to_string(), "rw-");
        assert_eq!(MemoryAccess::X.to_string(), "--x");
        assert_eq!(MemoryAccess::RWX.to_string(), "rwx");
    }
}
