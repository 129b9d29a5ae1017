use std::{
    cell::RefCell,
    path::Path,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{Error, KvmiConnector, KvmiDomain, KvmiListener};

/// Handoff point between the accept thread and the caller.
///
/// Holds at most one handle that the caller has not adopted yet. The lock is
/// only taken to stage or take that handle.
struct Pending<D> {
    domain: Mutex<Option<D>>,
    accepted: Condvar,
}

impl<D> Pending<D>
where
    D: KvmiDomain,
{
    fn new() -> Self {
        Self {
            domain: Mutex::new(None),
            accepted: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<D>> {
        self.domain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stages a freshly accepted handle, closing an older one that was never
    /// adopted.
    fn stage(&self, domain: D) {
        let mut pending = self.lock();

        if let Some(stale) = pending.replace(domain) {
            tracing::warn!("replacing unadopted introspection handle");
            stale.close();
        }

        self.accepted.notify_all();
    }

    fn take(&self) -> Option<D> {
        self.lock().take()
    }

    /// Waits until a handle is staged or `timeout` elapses, and takes it.
    fn wait(&self, guard: MutexGuard<'_, Option<D>>, timeout: Duration) -> Option<D> {
        let (mut guard, _) = self
            .accepted
            .wait_timeout_while(guard, timeout, |pending| pending.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        guard.take()
    }
}

/// Owns the introspection handle and the accept thread that produces it.
///
/// The live handle belongs to the caller's thread. Operations run without
/// any lock held, so watcher callbacks may use the driver again.
pub struct KvmiConnection<C>
where
    C: KvmiConnector,
{
    pending: Arc<Pending<C::Domain>>,
    current: RefCell<Option<C::Domain>>,
    listener: Option<C::Listener>,
}

impl<C> KvmiConnection<C>
where
    C: KvmiConnector,
{
    /// Starts listening on `socket_path` and blocks until the guest
    /// connects or `timeout` elapses.
    pub fn connect(connector: &C, socket_path: &Path, timeout: Duration) -> Result<Self, Error> {
        let pending = Arc::new(Pending::new());

        // Held across `listen` so that the accept callback cannot run
        // before we start waiting.
        let guard = pending.lock();

        let mut listener = connector.listen(socket_path, {
            let pending = Arc::clone(&pending);
            Box::new(move |domain| pending.stage(domain))
        })?;

        let domain = match pending.wait(guard, timeout) {
            Some(domain) => domain,
            None => {
                tracing::error!(?socket_path, ?timeout, "guest did not connect");

                listener.stop();
                if let Some(late) = pending.take() {
                    late.close();
                }

                return Err(Error::ConnectionTimeout);
            }
        };

        tracing::debug!(?socket_path, "guest connected");

        Ok(Self {
            pending,
            current: RefCell::new(Some(domain)),
            listener: Some(listener),
        })
    }

    /// Runs `f` with the live handle.
    ///
    /// A handle accepted since the last call replaces the current one, unless
    /// the current one is still in use further up the stack.
    pub fn with_domain<T>(
        &self,
        f: impl FnOnce(&C::Domain) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.adopt();

        let current = self.current.borrow();
        match current.as_ref() {
            Some(domain) => f(domain),
            None => Err(Error::ConnectionLost),
        }
    }

    /// Returns `true` if a handle is currently held.
    pub fn is_connected(&self) -> bool {
        self.adopt();
        self.current.borrow().is_some()
    }

    /// Closes the current handle and waits for the guest to connect again.
    pub fn reconnect(&self, timeout: Duration) -> Result<(), Error> {
        let mut current = self
            .current
            .try_borrow_mut()
            .map_err(|_| Error::NotSupported)?;

        if let Some(domain) = current.take() {
            domain.close();
        }

        let guard = self.pending.lock();
        match self.pending.wait(guard, timeout) {
            Some(domain) => *current = Some(domain),
            None => return Err(Error::ConnectionTimeout),
        }

        tracing::debug!("guest reconnected");
        Ok(())
    }

    /// Moves a staged handle into place, closing the one it replaces.
    fn adopt(&self) {
        let Ok(mut current) = self.current.try_borrow_mut() else {
            return;
        };

        let Some(domain) = self.pending.take() else {
            return;
        };

        if let Some(stale) = current.replace(domain) {
            tracing::warn!("replacing stale introspection handle");
            stale.close();
        }
    }
}

impl<C> Drop for KvmiConnection<C>
where
    C: KvmiConnector,
{
    fn drop(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }

        if let Some(domain) = self.current.get_mut().take() {
            domain.close();
        }

        if let Some(domain) = self.pending.take() {
            domain.close();
        }
    }
}
