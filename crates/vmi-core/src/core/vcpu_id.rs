use serde::{Deserialize, Serialize};

/// A virtual CPU index in `[0, vcpus)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VcpuId(pub u16);

impl VcpuId {
    /// Returns an iterator over the first `count` virtual CPUs.
    pub fn all(count: u16) -> impl Iterator<Item = VcpuId> {
        (0..count).map(VcpuId)
    }
}

impl From<u16> for VcpuId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<VcpuId> for u16 {
    fn from(value: VcpuId) -> Self {
        value.0
    }
}

impl std::fmt::Display for VcpuId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
