use std::time::Duration;

use vmi_arch_amd64::{Amd64, EventInterrupt, EventMemoryAccess, EventReason, ExceptionVector};
use vmi_core::{
    Architecture as _, MemoryAccess, Pa, Va, VcpuId, VmiEvent, VmiEventResponse, VmiWatchers,
};

use crate::{
    Error, FromExt, KVMI_NUM_EVENTS, KvmiDomain, KvmiError, KvmiEvent, KvmiEventKind,
    KvmiEventReply,
};

type Handler = fn(&KvmiEvent, &mut dyn VmiWatchers<Amd64>) -> Result<(), Error>;

/// Routes transport events to watchers.
///
/// Handlers are indexed by the protocol event identifier. Only the event
/// classes the driver can deliver have a handler, and only if events were
/// requested at all.
pub(crate) struct EventDispatcher {
    handlers: [Option<Handler>; KVMI_NUM_EVENTS],
}

impl EventDispatcher {
    pub fn new(events: bool) -> Self {
        let mut handlers: [Option<Handler>; KVMI_NUM_EVENTS] = [None; KVMI_NUM_EVENTS];

        if events {
            handlers[KvmiEventKind::CR as usize] = Some(handle_cr as Handler);
            handlers[KvmiEventKind::MSR as usize] = Some(handle_msr as Handler);
            handlers[KvmiEventKind::BREAKPOINT as usize] = Some(handle_breakpoint as Handler);
            handlers[KvmiEventKind::PF as usize] = Some(handle_page_fault as Handler);
            handlers[KvmiEventKind::PAUSE_VCPU as usize] = Some(handle_pause_vcpu as Handler);
        }

        Self { handlers }
    }

    /// Waits for one event and dispatches it.
    ///
    /// A timeout is not an error. The event is acknowledged only if it was
    /// handled successfully.
    pub fn dispatch(
        &self,
        domain: &impl KvmiDomain,
        timeout: Duration,
        watchers: &mut dyn VmiWatchers<Amd64>,
    ) -> Result<(), Error> {
        match domain.wait_event(timeout) {
            Ok(()) => {}
            Err(KvmiError::TimedOut) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        let event = domain.pop_event()?;
        let id = event.kind.id();

        let handler = match self.handlers.get(id as usize).copied().flatten() {
            Some(handler) => handler,
            None => {
                tracing::error!(id, vcpu = event.vcpu, "no handler for event");
                return Err(Error::ProtocolViolation(format!("no handler for event {id}")));
            }
        };

        handler(&event, watchers)?;

        tracing::trace!(seq = event.seq, "continue");
        domain.reply_event(&KvmiEventReply::proceed(event.seq))?;
        Ok(())
    }
}

impl FromExt<&KvmiEvent> for vmi_arch_amd64::Registers {
    fn from_ext(value: &KvmiEvent) -> Self {
        Self::from_ext(&value.state)
    }
}

fn log_response(response: &VmiEventResponse<Amd64>) {
    if response.requests_action() {
        tracing::warn!(
            flags = ?response.flags,
            registers = response.registers.is_some(),
            "response actions are not supported, continuing"
        );
    }
}

fn handle_cr(event: &KvmiEvent, _watchers: &mut dyn VmiWatchers<Amd64>) -> Result<(), Error> {
    if let KvmiEventKind::Cr {
        cr,
        old_value,
        new_value,
    } = event.kind
    {
        tracing::debug!(
            vcpu = event.vcpu,
            cr,
            old_value = format_args!("{old_value:#x}"),
            new_value = format_args!("{new_value:#x}"),
            "control register write"
        );
    }

    Ok(())
}

fn handle_msr(event: &KvmiEvent, _watchers: &mut dyn VmiWatchers<Amd64>) -> Result<(), Error> {
    if let KvmiEventKind::Msr {
        msr,
        old_value,
        new_value,
    } = event.kind
    {
        tracing::debug!(
            vcpu = event.vcpu,
            msr = format_args!("{msr:#x}"),
            old_value = format_args!("{old_value:#x}"),
            new_value = format_args!("{new_value:#x}"),
            "msr write"
        );
    }

    Ok(())
}

fn handle_breakpoint(
    event: &KvmiEvent,
    watchers: &mut dyn VmiWatchers<Amd64>,
) -> Result<(), Error> {
    let KvmiEventKind::Breakpoint { gpa, .. } = event.kind else {
        return Err(Error::ProtocolViolation("malformed breakpoint event".into()));
    };

    let registers = vmi_arch_amd64::Registers::from_ext(event);
    let gfn = Amd64::gfn_from_pa(Pa(gpa));
    let va = Va(registers.gp.rip);

    let watcher = match watchers.interrupt_watcher(ExceptionVector::Breakpoint) {
        Some(watcher) => watcher,
        None => {
            tracing::error!(vcpu = event.vcpu, %gfn, %va, "breakpoint without a watcher");
            return Err(Error::UnhandledEvent(format!("breakpoint at {va}")));
        }
    };

    let vmi_event = VmiEvent::new(
        VcpuId(event.vcpu),
        event.seq,
        registers,
        EventReason::Interrupt(EventInterrupt {
            gfn,
            va,
            vector: ExceptionVector::Breakpoint,
        }),
    );

    log_response(&watcher.handle_event(&vmi_event));
    Ok(())
}

fn handle_page_fault(
    event: &KvmiEvent,
    watchers: &mut dyn VmiWatchers<Amd64>,
) -> Result<(), Error> {
    let KvmiEventKind::PageFault { gpa, gva, access } = event.kind else {
        return Err(Error::ProtocolViolation("malformed page fault event".into()));
    };

    let pa = Pa(gpa);
    let va = Va(gva);
    let gfn = Amd64::gfn_from_pa(pa);
    let access = MemoryAccess::from_ext(access);

    let vmi_event = VmiEvent::new(
        VcpuId(event.vcpu),
        event.seq,
        vmi_arch_amd64::Registers::from_ext(event),
        EventReason::MemoryAccess(EventMemoryAccess { pa, va, access }),
    );

    if let Some((filter, watcher)) = watchers.gfn_watcher(gfn)
        && filter.intersects(access)
    {
        log_response(&watcher.handle_event(&vmi_event));
        return Ok(());
    }

    let mut matched = 0;
    watchers.for_each_generic_watcher(&mut |filter, watcher| {
        if filter.intersects(access) {
            matched += 1;
            log_response(&watcher.handle_event(&vmi_event));
        }
    });

    if matched == 0 {
        tracing::error!(vcpu = event.vcpu, %gfn, %va, %access, "memory event without a watcher");
        return Err(Error::UnhandledEvent(format!("{access} access to {pa} ({va})")));
    }

    tracing::trace!(%gfn, %access, matched, "generic watchers notified");
    Ok(())
}

fn handle_pause_vcpu(
    event: &KvmiEvent,
    _watchers: &mut dyn VmiWatchers<Amd64>,
) -> Result<(), Error> {
    tracing::error!(vcpu = event.vcpu, "pause confirmation outside of resume");

    Err(Error::ProtocolViolation(format!(
        "pause confirmation from vcpu {} outside of resume",
        event.vcpu
    )))
}
