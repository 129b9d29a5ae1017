//! Virtual Machine Introspection for KVM guests.
//!
//! This crate re-exports the workspace members:
//!
//! - the crate root: the generic introspection model (addresses, events,
//!   watchers, the [`VmiDriver`] trait).
//! - [`arch::amd64`]: x86-64 registers, MSRs and event reasons.
//! - [`driver::kvm`]: the driver for the KVM introspection transport.

pub use vmi_core::*;

/// Architecture definitions.
pub mod arch {
    /// AMD64 architecture.
    #[cfg(feature = "arch-amd64")]
    pub mod amd64 {
        pub use vmi_arch_amd64::*;
    }
}

/// Hypervisor drivers.
pub mod driver {
    /// KVM introspection driver.
    #[cfg(feature = "driver-kvm")]
    pub mod kvm {
        pub use vmi_driver_kvm::*;
    }
}
