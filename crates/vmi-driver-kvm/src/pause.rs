use std::{cell::Cell, time::Duration};

use crate::{Error, KvmiDomain, KvmiError, KvmiEventKind, KvmiEventReply};

/// Counts the pause confirmations that are still outstanding.
///
/// Zero means the guest is running.
pub(crate) struct PauseCoordinator {
    expected: Cell<u32>,
    drain_wait: Duration,
}

impl PauseCoordinator {
    pub fn new(drain_wait: Duration) -> Self {
        Self {
            expected: Cell::new(0),
            drain_wait,
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected.get()
    }

    pub fn reset(&self) {
        self.expected.set(0);
    }

    /// Requests every VCPU to pause. Does not wait for the confirmations.
    pub fn pause(&self, domain: &impl KvmiDomain) -> Result<(), Error> {
        if self.expected.get() > 0 {
            tracing::trace!(expected = self.expected.get(), "already pausing");
            return Ok(());
        }

        let count = domain.pause_all_vcpus()?;
        self.expected.set(count);

        tracing::debug!(count, "pause requested");
        Ok(())
    }

    /// Drains one pause confirmation per VCPU, acknowledging each of them.
    ///
    /// Every event seen while draining must be a pause confirmation.
    pub fn resume(&self, domain: &impl KvmiDomain) -> Result<(), Error> {
        while self.expected.get() > 0 {
            match domain.wait_event(self.drain_wait) {
                Ok(()) => {}
                Err(KvmiError::TimedOut) => continue,
                Err(err) => return Err(err.into()),
            }

            let event = domain.pop_event()?;

            if event.kind != KvmiEventKind::PauseVcpu {
                tracing::error!(
                    vcpu = event.vcpu,
                    id = event.kind.id(),
                    "unexpected event while draining pause confirmations"
                );

                return Err(Error::ProtocolViolation(format!(
                    "event {} on vcpu {} while draining pause confirmations",
                    event.kind.id(),
                    event.vcpu
                )));
            }

            self.expected.set(self.expected.get() - 1);
            tracing::trace!(
                vcpu = event.vcpu,
                remaining = self.expected.get(),
                "pause confirmed"
            );

            domain.reply_event(&KvmiEventReply::proceed(event.seq))?;
        }

        Ok(())
    }
}
