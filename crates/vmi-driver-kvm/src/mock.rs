use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    KvmRegs, KvmVcpuState, KvmiAcceptCallback, KvmiConnector, KvmiDomain, KvmiError, KvmiEvent,
    KvmiEventFlags, KvmiEventKind, KvmiEventReply, KvmiListener, KvmiPageAccess, VirtDomain,
    VirtManager,
};

///////////////////////////////////////////////////////////////////////////////
// Mock Domain
///////////////////////////////////////////////////////////////////////////////

pub struct MockState {
    pub vcpus: u32,

    /// Scripted events, delivered in order.
    pub events: VecDeque<KvmiEvent>,

    /// Number of waits that time out before the next event is delivered.
    pub timeouts: usize,

    pub replies: Vec<KvmiEventReply>,

    /// Page access per `(vcpu, gpa)`. Missing entries allow everything.
    pub access: HashMap<(u16, u64), KvmiPageAccess>,
    pub event_flags: Vec<KvmiEventFlags>,
    pub crs: HashSet<(u16, u32)>,
    pub msrs: HashSet<(u16, u32)>,

    pub memory: Vec<u8>,
    pub states: Vec<KvmVcpuState>,
    pub faults: Vec<(u16, u64, u32)>,

    /// One-shot failures, matched by call name and VCPU.
    pub failures: Vec<(&'static str, u16)>,
    pub disconnected: bool,

    pub calls: HashMap<&'static str, usize>,
    pub log: Vec<&'static str>,
}

impl MockState {
    fn check(&mut self, call: &'static str, vcpu: u16) -> Result<(), KvmiError> {
        *self.calls.entry(call).or_default() += 1;

        if self.disconnected {
            return Err(KvmiError::Disconnected);
        }

        let position = self
            .failures
            .iter()
            .position(|&(name, index)| name == call && index == vcpu);

        match position {
            Some(position) => {
                self.failures.remove(position);
                Err(KvmiError::Rejected {
                    errno: libc::EINVAL,
                })
            }
            None => Ok(()),
        }
    }

    fn vcpu(&self, vcpu: u16) -> Result<usize, KvmiError> {
        match usize::from(vcpu) < self.states.len() {
            true => Ok(usize::from(vcpu)),
            false => Err(KvmiError::Rejected {
                errno: libc::EINVAL,
            }),
        }
    }

    fn range(&self, gpa: u64, len: usize) -> Result<std::ops::Range<usize>, KvmiError> {
        let start = gpa as usize;
        let end = start + len;

        match end <= self.memory.len() {
            true => Ok(start..end),
            false => Err(KvmiError::Rejected {
                errno: libc::EFAULT,
            }),
        }
    }
}

#[derive(Clone)]
pub struct MockDomain(Arc<Mutex<MockState>>);

impl MockDomain {
    pub fn new(vcpus: u32, memory_size: usize) -> Self {
        Self(Arc::new(Mutex::new(MockState {
            vcpus,
            events: VecDeque::new(),
            timeouts: 0,
            replies: Vec::new(),
            access: HashMap::new(),
            event_flags: vec![KvmiEventFlags::empty(); vcpus as usize],
            crs: HashSet::new(),
            msrs: HashSet::new(),
            memory: vec![0; memory_size],
            states: vec![KvmVcpuState::default(); vcpus as usize],
            faults: Vec::new(),
            failures: Vec::new(),
            disconnected: false,
            calls: HashMap::new(),
            log: Vec::new(),
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    /// Queues an event with a zeroed register state.
    pub fn push_event(&self, seq: u32, vcpu: u16, kind: KvmiEventKind) {
        self.push_event_with_state(seq, vcpu, KvmVcpuState::default(), kind);
    }

    pub fn push_event_with_state(
        &self,
        seq: u32,
        vcpu: u16,
        state: KvmVcpuState,
        kind: KvmiEventKind,
    ) {
        self.state().events.push_back(KvmiEvent {
            seq,
            vcpu,
            state,
            kind,
        });
    }

    pub fn fail(&self, call: &'static str, vcpu: u16) {
        self.state().failures.push((call, vcpu));
    }

    pub fn calls(&self, call: &str) -> usize {
        self.state().calls.get(call).copied().unwrap_or_default()
    }

    pub fn access(&self, vcpu: u16, gpa: u64) -> KvmiPageAccess {
        self.state()
            .access
            .get(&(vcpu, gpa))
            .copied()
            .unwrap_or(KvmiPageAccess::all())
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.state().log.clone()
    }

    fn push_log(&self, entry: &'static str) {
        self.state().log.push(entry);
    }
}

impl KvmiDomain for MockDomain {
    fn vcpu_count(&self) -> Result<u32, KvmiError> {
        let mut state = self.state();
        state.check("vcpu_count", 0)?;
        Ok(state.vcpus)
    }

    fn wait_event(&self, _timeout: Duration) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("wait_event", 0)?;

        if state.timeouts > 0 {
            state.timeouts -= 1;
            return Err(KvmiError::TimedOut);
        }

        match state.events.is_empty() {
            true => Err(KvmiError::TimedOut),
            false => Ok(()),
        }
    }

    fn pop_event(&self) -> Result<KvmiEvent, KvmiError> {
        let mut state = self.state();
        state.check("pop_event", 0)?;
        state.events.pop_front().ok_or(KvmiError::Rejected {
            errno: libc::ENOENT,
        })
    }

    fn reply_event(&self, reply: &KvmiEventReply) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("reply_event", 0)?;
        state.replies.push(*reply);
        Ok(())
    }

    fn read_physical(&self, gpa: u64, buffer: &mut [u8]) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("read_physical", 0)?;
        let range = state.range(gpa, buffer.len())?;
        buffer.copy_from_slice(&state.memory[range]);
        Ok(())
    }

    fn write_physical(&self, gpa: u64, data: &[u8]) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("write_physical", 0)?;
        let range = state.range(gpa, data.len())?;
        state.memory[range].copy_from_slice(data);
        Ok(())
    }

    fn registers(&self, vcpu: u16, msrs: &[u32]) -> Result<KvmVcpuState, KvmiError> {
        let mut state = self.state();
        state.check("registers", vcpu)?;
        let index = state.vcpu(vcpu)?;

        let mut result = state.states[index].clone();
        result.msrs.retain(|entry| msrs.contains(&entry.index));
        Ok(result)
    }

    fn set_registers(&self, vcpu: u16, regs: &KvmRegs) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("set_registers", vcpu)?;
        let index = state.vcpu(vcpu)?;
        state.states[index].regs = *regs;
        Ok(())
    }

    fn page_access(&self, vcpu: u16, gpa: u64) -> Result<KvmiPageAccess, KvmiError> {
        let mut state = self.state();
        state.check("page_access", vcpu)?;

        Ok(state
            .access
            .get(&(vcpu, gpa))
            .copied()
            .unwrap_or(KvmiPageAccess::all()))
    }

    fn set_page_access(
        &self,
        vcpu: u16,
        gpa: u64,
        access: KvmiPageAccess,
    ) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("set_page_access", vcpu)?;
        state.access.insert((vcpu, gpa), access);
        Ok(())
    }

    fn control_events(&self, vcpu: u16, flags: KvmiEventFlags) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("control_events", vcpu)?;
        let index = state.vcpu(vcpu)?;
        state.event_flags[index] = flags;
        Ok(())
    }

    fn control_cr(&self, vcpu: u16, cr: u32, enable: bool) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("control_cr", vcpu)?;

        match enable {
            true => state.crs.insert((vcpu, cr)),
            false => state.crs.remove(&(vcpu, cr)),
        };

        Ok(())
    }

    fn control_msr(&self, vcpu: u16, msr: u32, enable: bool) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("control_msr", vcpu)?;

        match enable {
            true => state.msrs.insert((vcpu, msr)),
            false => state.msrs.remove(&(vcpu, msr)),
        };

        Ok(())
    }

    fn inject_page_fault(&self, vcpu: u16, gva: u64, error_code: u32) -> Result<(), KvmiError> {
        let mut state = self.state();
        state.check("inject_page_fault", vcpu)?;
        state.faults.push((vcpu, gva, error_code));
        Ok(())
    }

    fn pause_all_vcpus(&self) -> Result<u32, KvmiError> {
        let mut state = self.state();
        state.check("pause_all_vcpus", 0)?;
        Ok(state.vcpus)
    }

    fn close(self) {
        self.push_log("closed");
    }
}

///////////////////////////////////////////////////////////////////////////////
// Mock Connector
///////////////////////////////////////////////////////////////////////////////

type SharedCallback = Arc<KvmiAcceptCallback<MockDomain>>;

/// When the mock guest connects.
#[derive(Debug, Clone, Copy)]
pub enum MockAccept {
    /// After the given delay, from the accept thread.
    After(Duration),

    /// Never.
    Never,

    /// From within [`KvmiListener::stop`], before the accept thread is
    /// joined.
    OnStop,
}

pub struct MockConnector {
    domain: MockDomain,
    accept: MockAccept,
    callback: Mutex<Option<SharedCallback>>,
}

impl MockConnector {
    pub fn new(domain: MockDomain, accept: MockAccept) -> Self {
        Self {
            domain,
            accept,
            callback: Mutex::new(None),
        }
    }

    /// Returns the accept callback registered by the last `listen`.
    pub fn acceptor(&self) -> SharedCallback {
        self.callback.lock().unwrap().clone().unwrap()
    }
}

impl KvmiConnector for MockConnector {
    type Domain = MockDomain;
    type Listener = MockListener;

    fn listen(
        &self,
        _socket_path: &Path,
        on_accept: KvmiAcceptCallback<MockDomain>,
    ) -> Result<MockListener, KvmiError> {
        let callback: SharedCallback = Arc::new(on_accept);
        *self.callback.lock().unwrap() = Some(Arc::clone(&callback));

        let stop = Arc::new(AtomicBool::new(false));

        let thread = match self.accept {
            MockAccept::After(delay) => Some(std::thread::spawn({
                let stop = Arc::clone(&stop);
                let callback = Arc::clone(&callback);
                let domain = self.domain.clone();

                move || {
                    let deadline = Instant::now() + delay;
                    while Instant::now() < deadline {
                        if stop.load(Ordering::SeqCst) {
                            return;
                        }

                        std::thread::sleep(Duration::from_millis(1));
                    }

                    domain.push_log("accepted");
                    callback(domain);
                }
            })),
            MockAccept::Never | MockAccept::OnStop => None,
        };

        let late = match self.accept {
            MockAccept::OnStop => Some((callback, self.domain.clone())),
            _ => None,
        };

        Ok(MockListener {
            domain: self.domain.clone(),
            stop,
            thread,
            late,
        })
    }
}

pub struct MockListener {
    domain: MockDomain,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    late: Option<(SharedCallback, MockDomain)>,
}

impl KvmiListener for MockListener {
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);

        if let Some((callback, domain)) = self.late.take() {
            domain.push_log("accepted");
            callback(domain);
        }

        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }

        self.domain.push_log("stopped");
    }
}

///////////////////////////////////////////////////////////////////////////////
// Mock Manager
///////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct MockVirtDomain {
    pub id: u64,
    pub name: String,
    pub max_memory_kib: u64,
}

impl VirtDomain for MockVirtDomain {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn max_memory_kib(&self) -> u64 {
        self.max_memory_kib
    }
}

pub struct MockManager {
    pub domains: Vec<MockVirtDomain>,
}

impl VirtManager for MockManager {
    type Domain = MockVirtDomain;

    fn lookup_domain_by_id(&self, id: u64) -> Option<MockVirtDomain> {
        self.domains.iter().find(|domain| domain.id == id).cloned()
    }

    fn lookup_domain_by_name(&self, name: &str) -> Option<MockVirtDomain> {
        self.domains
            .iter()
            .find(|domain| domain.name == name)
            .cloned()
    }
}
