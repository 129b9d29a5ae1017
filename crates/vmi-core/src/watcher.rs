use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{Architecture, Gfn, MemoryAccess, VmiEvent, VmiEventResponse};

/// A callback invoked when a monitored event occurs.
///
/// Any `FnMut(&VmiEvent<Arch>) -> VmiEventResponse<Arch>` closure is a
/// watcher.
pub trait VmiWatcher<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Handles an event and returns the response for the virtual CPU.
    fn handle_event(&mut self, event: &VmiEvent<Arch>) -> VmiEventResponse<Arch>;
}

impl<Arch, F> VmiWatcher<Arch> for F
where
    Arch: Architecture + ?Sized,
    F: FnMut(&VmiEvent<Arch>) -> VmiEventResponse<Arch>,
{
    fn handle_event(&mut self, event: &VmiEvent<Arch>) -> VmiEventResponse<Arch> {
        self(event)
    }
}

/// Resolves the watcher that should receive a decoded event.
///
/// Drivers call into this during [`wait_for_event`] and never hold on to
/// the returned references.
///
/// [`wait_for_event`]: crate::VmiDriver::wait_for_event
pub trait VmiWatchers<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Returns the watcher registered for an interrupt vector.
    fn interrupt_watcher(&mut self, vector: Arch::InterruptVector)
    -> Option<&mut dyn VmiWatcher<Arch>>;

    /// Returns the watcher registered for an exact guest frame, together
    /// with the access mask it was registered with.
    fn gfn_watcher(&mut self, gfn: Gfn) -> Option<(MemoryAccess, &mut dyn VmiWatcher<Arch>)>;

    /// Calls `f` for every generic memory watcher, in registration order.
    fn for_each_generic_watcher(
        &mut self,
        f: &mut dyn FnMut(MemoryAccess, &mut dyn VmiWatcher<Arch>),
    );
}

/// Watchers keyed by interrupt vector, by guest frame, and by access mask.
///
/// Registering a second watcher under an existing key replaces the first
/// one, which is handed back to the caller.
pub struct WatcherRegistry<Arch>
where
    Arch: Architecture + ?Sized,
{
    interrupts: HashMap<Arch::InterruptVector, Box<dyn VmiWatcher<Arch>>>,
    gfns: HashMap<Gfn, (MemoryAccess, Box<dyn VmiWatcher<Arch>>)>,
    generic: IndexMap<MemoryAccess, Box<dyn VmiWatcher<Arch>>>,
}

impl<Arch> Default for WatcherRegistry<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn default() -> Self {
        Self {
            interrupts: HashMap::new(),
            gfns: HashMap::new(),
            generic: IndexMap::new(),
        }
    }
}

impl<Arch> WatcherRegistry<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watcher for an interrupt vector.
    pub fn watch_interrupt(
        &mut self,
        vector: Arch::InterruptVector,
        watcher: impl VmiWatcher<Arch> + 'static,
    ) -> Option<Box<dyn VmiWatcher<Arch>>> {
        self.interrupts.insert(vector, Box::new(watcher))
    }

    /// Registers a watcher for accesses to a single guest frame.
    pub fn watch_gfn(
        &mut self,
        gfn: Gfn,
        access: MemoryAccess,
        watcher: impl VmiWatcher<Arch> + 'static,
    ) -> Option<Box<dyn VmiWatcher<Arch>>> {
        self.gfns
            .insert(gfn, (access, Box::new(watcher)))
            .map(|(_, previous)| previous)
    }

    /// Registers a watcher for every access that intersects `access`.
    pub fn watch_generic(
        &mut self,
        access: MemoryAccess,
        watcher: impl VmiWatcher<Arch> + 'static,
    ) -> Option<Box<dyn VmiWatcher<Arch>>> {
        self.generic.insert(access, Box::new(watcher))
    }

    /// Removes the watcher for an interrupt vector.
    pub fn unwatch_interrupt(
        &mut self,
        vector: Arch::InterruptVector,
    ) -> Option<Box<dyn VmiWatcher<Arch>>> {
        self.interrupts.remove(&vector)
    }

    /// Removes the watcher for a guest frame.
    pub fn unwatch_gfn(&mut self, gfn: Gfn) -> Option<Box<dyn VmiWatcher<Arch>>> {
        self.gfns.remove(&gfn).map(|(_, watcher)| watcher)
    }

    /// Removes a generic watcher, keeping the order of the remaining ones.
    pub fn unwatch_generic(&mut self, access: MemoryAccess) -> Option<Box<dyn VmiWatcher<Arch>>> {
        self.generic.shift_remove(&access)
    }

    /// Returns `true` if no watchers are registered.
    pub fn is_empty(&self) -> bool {
        self.interrupts.is_empty() && self.gfns.is_empty() && self.generic.is_empty()
    }
}

impl<Arch> VmiWatchers<Arch> for WatcherRegistry<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn interrupt_watcher(
        &mut self,
        vector: Arch::InterruptVector,
    ) -> Option<&mut dyn VmiWatcher<Arch>> {
        self.interrupts
            .get_mut(&vector)
            .map(|watcher| watcher.as_mut() as &mut dyn VmiWatcher<Arch>)
    }

    fn gfn_watcher(&mut self, gfn: Gfn) -> Option<(MemoryAccess, &mut dyn VmiWatcher<Arch>)> {
        self.gfns
            .get_mut(&gfn)
            .map(|(access, watcher)| (*access, watcher.as_mut() as &mut dyn VmiWatcher<Arch>))
    }

    fn for_each_generic_watcher(
        &mut self,
        f: &mut dyn FnMut(MemoryAccess, &mut dyn VmiWatcher<Arch>),
    ) {
        for (access, watcher) in self.generic.iter_mut() {
            f(*access, watcher.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{Pa, VcpuId, arch::Registers};

    #[derive(Debug)]
    struct TestArch;

    #[derive(Debug, Default, Clone, Copy)]
    struct TestRegisters {
        ip: u64,
    }

    impl Registers for TestRegisters {
        type GpRegisters = u64;

        fn instruction_pointer(&self) -> u64 {
            self.ip
        }

        fn set_instruction_pointer(&mut self, ip: u64) {
            self.ip = ip;
        }

        fn stack_pointer(&self) -> u64 {
            0
        }

        fn gp_registers(&self) -> u64 {
            self.ip
        }

        fn set_gp_registers(&mut self, gp: &u64) {
            self.ip = *gp;
        }
    }

    #[expect(dead_code)]
    #[derive(Debug, Clone, Copy)]
    struct TestReason(Pa, MemoryAccess);

    impl Architecture for TestArch {
        const PAGE_SIZE: u64 = 0x1000;
        const PAGE_SHIFT: u64 = 12;

        type Registers = TestRegisters;
        type InterruptVector = u8;
        type EventMonitor = ();
        type EventReason = TestReason;
    }

    fn event(access: MemoryAccess) -> VmiEvent<TestArch> {
        VmiEvent::new(
            VcpuId(0),
            1,
            TestRegisters::default(),
            TestReason(Pa(0x5000), access),
        )
    }

    #[test]
    fn generic_watchers_in_registration_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = WatcherRegistry::<TestArch>::new();

        for access in [MemoryAccess::X, MemoryAccess::R, MemoryAccess::W] {
            let calls = calls.clone();
            registry.watch_generic(access, move |_: &VmiEvent<TestArch>| {
                calls.borrow_mut().push(access);
                VmiEventResponse::default()
            });
        }

        let event = event(MemoryAccess::W);
        registry.for_each_generic_watcher(&mut |_, watcher| {
            watcher.handle_event(&event);
        });

        assert_eq!(
            *calls.borrow(),
            vec![MemoryAccess::X, MemoryAccess::R, MemoryAccess::W]
        );
    }

    #[test]
    fn unwatch_generic_keeps_order() {
        let mut registry = WatcherRegistry::<TestArch>::new();
        for access in [MemoryAccess::X, MemoryAccess::R, MemoryAccess::W] {
            registry.watch_generic(access, |_: &VmiEvent<TestArch>| {
                VmiEventResponse::default()
            });
        }

        assert!(registry.unwatch_generic(MemoryAccess::X).is_some());

        let mut seen = Vec::new();
        registry.for_each_generic_watcher(&mut |access, _| seen.push(access));
        assert_eq!(seen, vec![MemoryAccess::R, MemoryAccess::W]);
    }

    #[test]
    fn gfn_watcher_carries_access() {
        let mut registry = WatcherRegistry::<TestArch>::new();
        assert!(registry.gfn_watcher(Gfn(5)).is_none());

        registry.watch_gfn(Gfn(5), MemoryAccess::RW, |_: &VmiEvent<TestArch>| {
            VmiEventResponse::reinject_interrupt()
        });

        let (access, watcher) = registry.gfn_watcher(Gfn(5)).unwrap();
        assert_eq!(access, MemoryAccess::RW);

        let response = watcher.handle_event(&event(MemoryAccess::R));
        assert!(response.requests_action());
    }

    #[test]
    fn replacing_returns_previous() {
        let mut registry = WatcherRegistry::<TestArch>::new();
        assert!(registry.is_empty());

        let first = registry.watch_interrupt(3, |_: &VmiEvent<TestArch>| {
            VmiEventResponse::default()
        });
        assert!(first.is_none());

        let second = registry.watch_interrupt(3, |_: &VmiEvent<TestArch>| {
            VmiEventResponse::default()
        });
        assert!(second.is_some());
        assert!(registry.interrupt_watcher(3).is_some());
        assert!(registry.interrupt_watcher(4).is_none());

        registry.unwatch_interrupt(3);
        assert!(registry.is_empty());
    }
}
