//! The KVMI introspection transport.
//!
//! The driver talks to the hypervisor exclusively through the
//! [`KvmiConnector`] and [`KvmiDomain`] traits. The types in this module
//! mirror the structures exchanged over the introspection socket.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::KvmiError;

/// General-purpose register state of a VCPU (`struct kvm_regs`).
#[expect(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvmRegs {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rsp: u64,
    pub rbp: u64,
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

/// A segment register (`struct kvm_segment`).
#[expect(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvmSegment {
    pub base: u64,
    pub limit: u32,
    pub selector: u16,
    pub type_: u8,
    pub present: u8,
    pub dpl: u8,
    pub db: u8,
    pub s: u8,
    pub l: u8,
    pub g: u8,
    pub avl: u8,
    pub unusable: u8,
}

/// A descriptor table register (`struct kvm_dtable`).
#[expect(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvmDtable {
    pub base: u64,
    pub limit: u16,
}

/// Special register state of a VCPU (`struct kvm_sregs`).
#[expect(missing_docs)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvmSregs {
    pub cs: KvmSegment,
    pub ds: KvmSegment,
    pub es: KvmSegment,
    pub fs: KvmSegment,
    pub gs: KvmSegment,
    pub ss: KvmSegment,
    pub tr: KvmSegment,
    pub ldt: KvmSegment,
    pub gdt: KvmDtable,
    pub idt: KvmDtable,
    pub cr0: u64,
    pub cr2: u64,
    pub cr3: u64,
    pub cr4: u64,
    pub cr8: u64,
    pub efer: u64,
    pub apic_base: u64,
}

/// A single model-specific register value (`struct kvm_msr_entry`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvmMsrEntry {
    /// The MSR index.
    pub index: u32,

    /// The MSR value.
    pub data: u64,
}

/// Register state of a VCPU as reported by the transport.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvmVcpuState {
    /// General-purpose registers.
    pub regs: KvmRegs,

    /// Control, segment and descriptor table registers.
    pub sregs: KvmSregs,

    /// The MSRs that were requested, in request order.
    pub msrs: Vec<KvmMsrEntry>,
}

impl KvmVcpuState {
    /// Returns the value of the MSR with the given index, if it was read.
    pub fn msr(&self, index: u32) -> Option<u64> {
        self.msrs
            .iter()
            .find(|entry| entry.index == index)
            .map(|entry| entry.data)
    }
}

bitflags::bitflags! {
    /// Native page access mask. A set bit means the access is allowed.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct KvmiPageAccess: u8 {
        /// Read access.
        const R = 1 << 0;

        /// Write access.
        const W = 1 << 1;

        /// Execute access.
        const X = 1 << 2;
    }
}

/// Number of event identifiers defined by the KVMI protocol.
pub const KVMI_NUM_EVENTS: usize = 12;

bitflags::bitflags! {
    /// Per-VCPU event delivery mask. Bit `n` enables event identifier `n`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct KvmiEventFlags: u32 {
        /// Control register writes.
        const CR = 1 << KvmiEventKind::CR;

        /// Model-specific register writes.
        const MSR = 1 << KvmiEventKind::MSR;

        /// `INT3` breakpoints.
        const BREAKPOINT = 1 << KvmiEventKind::BREAKPOINT;

        /// Page faults raised by restricted page access.
        const PF = 1 << KvmiEventKind::PF;
    }
}

/// The payload of an introspection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvmiEventKind {
    /// A monitored control register was written.
    Cr {
        /// Control register number.
        cr: u32,

        /// Value before the write.
        old_value: u64,

        /// Value being written.
        new_value: u64,
    },

    /// A monitored model-specific register was written.
    Msr {
        /// MSR index.
        msr: u32,

        /// Value before the write.
        old_value: u64,

        /// Value being written.
        new_value: u64,
    },

    /// The guest executed `INT3`.
    Breakpoint {
        /// Guest physical address of the instruction.
        gpa: u64,

        /// Length of the instruction.
        insn_len: u8,
    },

    /// The guest touched a page whose access is restricted.
    PageFault {
        /// Guest physical address of the access.
        gpa: u64,

        /// Guest virtual address of the access.
        gva: u64,

        /// The access that was attempted.
        access: KvmiPageAccess,
    },

    /// A VCPU acknowledged a pause request.
    PauseVcpu,

    /// An event identifier the driver does not know about.
    Unknown(u32),
}

impl KvmiEventKind {
    /// Event identifier of control register events.
    pub const CR: u32 = 1;

    /// Event identifier of MSR events.
    pub const MSR: u32 = 2;

    /// Event identifier of breakpoint events.
    pub const BREAKPOINT: u32 = 4;

    /// Event identifier of page fault events.
    pub const PF: u32 = 6;

    /// Event identifier of pause confirmations.
    pub const PAUSE_VCPU: u32 = 10;

    /// Returns the protocol event identifier.
    pub fn id(&self) -> u32 {
        match self {
            Self::Cr { .. } => Self::CR,
            Self::Msr { .. } => Self::MSR,
            Self::Breakpoint { .. } => Self::BREAKPOINT,
            Self::PageFault { .. } => Self::PF,
            Self::PauseVcpu => Self::PAUSE_VCPU,
            Self::Unknown(id) => *id,
        }
    }
}

/// An event popped from the introspection socket.
#[derive(Debug, Clone)]
pub struct KvmiEvent {
    /// Sequence number used to correlate the reply.
    pub seq: u32,

    /// The VCPU that generated the event.
    pub vcpu: u16,

    /// Register state of the VCPU at the time of the event.
    pub state: KvmVcpuState,

    /// Event specific payload.
    pub kind: KvmiEventKind,
}

/// Action requested from the hypervisor when replying to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvmiEventAction {
    /// Let the VCPU continue.
    Continue,

    /// Re-enter the guest without completing the instruction.
    Retry,

    /// Crash the guest.
    Crash,
}

/// Reply to a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvmiEventReply {
    /// Sequence number of the event being answered.
    pub seq: u32,

    /// The requested action.
    pub action: KvmiEventAction,
}

impl KvmiEventReply {
    /// A reply letting the VCPU continue.
    pub fn proceed(seq: u32) -> Self {
        Self {
            seq,
            action: KvmiEventAction::Continue,
        }
    }
}

/// A live introspection connection to one guest.
///
/// Handles are created by the accept callback of a [`KvmiConnector`] on
/// the transport's accept thread, so they must be [`Send`].
pub trait KvmiDomain: Send + 'static {
    /// Returns the number of VCPUs of the guest.
    fn vcpu_count(&self) -> Result<u32, KvmiError>;

    /// Waits until an event is available.
    ///
    /// Fails with [`KvmiError::TimedOut`] if nothing arrived within
    /// `timeout`.
    fn wait_event(&self, timeout: Duration) -> Result<(), KvmiError>;

    /// Pops the next event.
    fn pop_event(&self) -> Result<KvmiEvent, KvmiError>;

    /// Replies to a previously popped event.
    fn reply_event(&self, reply: &KvmiEventReply) -> Result<(), KvmiError>;

    /// Reads guest physical memory.
    fn read_physical(&self, gpa: u64, buffer: &mut [u8]) -> Result<(), KvmiError>;

    /// Writes guest physical memory.
    fn write_physical(&self, gpa: u64, data: &[u8]) -> Result<(), KvmiError>;

    /// Reads the registers of a VCPU together with the requested MSRs.
    fn registers(&self, vcpu: u16, msrs: &[u32]) -> Result<KvmVcpuState, KvmiError>;

    /// Writes the general-purpose registers of a VCPU.
    fn set_registers(&self, vcpu: u16, regs: &KvmRegs) -> Result<(), KvmiError>;

    /// Reads the access mask of a guest page.
    fn page_access(&self, vcpu: u16, gpa: u64) -> Result<KvmiPageAccess, KvmiError>;

    /// Sets the access mask of a guest page.
    fn set_page_access(&self, vcpu: u16, gpa: u64, access: KvmiPageAccess)
    -> Result<(), KvmiError>;

    /// Replaces the event delivery mask of a VCPU.
    fn control_events(&self, vcpu: u16, flags: KvmiEventFlags) -> Result<(), KvmiError>;

    /// Enables or disables interception of writes to a control register.
    fn control_cr(&self, vcpu: u16, cr: u32, enable: bool) -> Result<(), KvmiError>;

    /// Enables or disables interception of writes to an MSR.
    fn control_msr(&self, vcpu: u16, msr: u32, enable: bool) -> Result<(), KvmiError>;

    /// Injects a page fault into a VCPU.
    fn inject_page_fault(&self, vcpu: u16, gva: u64, error_code: u32) -> Result<(), KvmiError>;

    /// Asks every VCPU to pause and returns the number of pause
    /// confirmations that will follow.
    fn pause_all_vcpus(&self) -> Result<u32, KvmiError>;

    /// Closes the connection.
    fn close(self);
}

/// Callback invoked on the accept thread for every new connection.
pub type KvmiAcceptCallback<D> = Box<dyn Fn(D) + Send + Sync + 'static>;

/// Accepts introspection connections on a socket.
pub trait KvmiConnector {
    /// The connection handle produced by the listener.
    type Domain: KvmiDomain;

    /// The background accept thread.
    type Listener: KvmiListener;

    /// Starts accepting connections on `socket_path`.
    ///
    /// `on_accept` is called from the accept thread, never from the
    /// calling thread.
    fn listen(
        &self,
        socket_path: &Path,
        on_accept: KvmiAcceptCallback<Self::Domain>,
    ) -> Result<Self::Listener, KvmiError>;
}

/// A running accept thread.
pub trait KvmiListener {
    /// Stops accepting connections and joins the accept thread.
    ///
    /// No accept callback runs after this returns.
    fn stop(&mut self);
}
