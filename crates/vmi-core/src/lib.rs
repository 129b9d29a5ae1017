//! Core VMI functionality.
//!
//! This crate holds the hypervisor-independent model: guest addresses,
//! memory access masks, architecture traits, events and their responses,
//! the watcher registry, and the [`VmiDriver`] interface that concrete
//! drivers implement.

pub mod arch;
mod core;
mod driver;
mod error;
mod event;
mod page;
mod watcher;

pub use self::{
    arch::{Architecture, Registers},
    core::{Gfn, MemoryAccess, Pa, Va, VcpuId, VmiInfo},
    driver::VmiDriver,
    error::VmiError,
    event::{VmiEvent, VmiEventResponse, VmiEventResponseFlags},
    page::VmiMappedPage,
    watcher::{VmiWatcher, VmiWatchers, WatcherRegistry},
};

/// A guard that pauses the virtual machine on creation and resumes it on
/// drop.
pub struct VmiPauseGuard<'a, Driver>
where
    Driver: VmiDriver,
{
    driver: &'a Driver,
}

impl<'a, Driver> VmiPauseGuard<'a, Driver>
where
    Driver: VmiDriver,
{
    /// Creates a new pause guard.
    pub fn new(driver: &'a Driver) -> Result<Self, VmiError> {
        driver.pause()?;
        Ok(Self { driver })
    }
}

impl<Driver> Drop for VmiPauseGuard<'_, Driver>
where
    Driver: VmiDriver,
{
    fn drop(&mut self) {
        if let Err(err) = self.driver.resume() {
            tracing::error!(?err, "Failed to resume the virtual machine");
        }
    }
}
