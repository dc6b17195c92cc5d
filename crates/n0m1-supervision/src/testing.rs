//! In-memory [`ProcessPlatform`] for deterministic supervision tests.

use n0m1_common::{ProcessError, ProcessResult};
use n0m1_process::{LaunchSpec, ProcessPlatform, SignalDelivery};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehaviour {
    ExitsOnTerm,
    IgnoresTerm,
    /// Survives even the kill.
    Unkillable,
    /// Alive, but every signal is refused.
    Foreign,
    /// Gone by the time any signal arrives.
    VanishesOnSignal,
}

pub struct FakePlatform {
    processes: Mutex<HashMap<u32, FakeBehaviour>>,
    signals: Mutex<Vec<(&'static str, u32)>>,
    launched: Mutex<Vec<LaunchSpec>>,
    failing: Mutex<HashSet<String>>,
    next_pid: AtomicU32,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
            signals: Mutex::new(Vec::new()),
            launched: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            next_pid: AtomicU32::new(10_000),
        }
    }
}

impl FakePlatform {
    pub fn add(&self, pid: u32, behaviour: FakeBehaviour) {
        self.processes.lock().insert(pid, behaviour);
    }

    pub fn exit(&self, pid: u32) {
        self.processes.lock().remove(&pid);
    }

    /// Make every launch of `id` fail.
    pub fn fail_launch(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn signals(&self) -> Vec<(&'static str, u32)> {
        self.signals.lock().clone()
    }

    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.lock().clone()
    }
}

impl ProcessPlatform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn is_running(&self, pid: u32) -> bool {
        self.processes.lock().contains_key(&pid)
    }

    fn launch_detached(&self, spec: &LaunchSpec) -> ProcessResult<u32> {
        if self.failing.lock().contains(&spec.id) {
            return Err(ProcessError::spawn_failed(&spec.id, "No such file or directory"));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.processes.lock().insert(pid, FakeBehaviour::ExitsOnTerm);
        self.launched.lock().push(spec.clone());
        Ok(pid)
    }

    fn terminate_graceful(&self, pid: u32) -> ProcessResult<SignalDelivery> {
        self.signals.lock().push(("TERM", pid));
        let mut processes = self.processes.lock();
        match processes.get(&pid).copied() {
            None => Ok(SignalDelivery::NotRunning),
            Some(FakeBehaviour::Foreign) => Err(ProcessError::PermissionDenied { pid }),
            Some(FakeBehaviour::ExitsOnTerm) => {
                processes.remove(&pid);
                Ok(SignalDelivery::Delivered)
            }
            Some(FakeBehaviour::VanishesOnSignal) => {
                processes.remove(&pid);
                Ok(SignalDelivery::NotRunning)
            }
            Some(FakeBehaviour::IgnoresTerm) | Some(FakeBehaviour::Unkillable) => {
                Ok(SignalDelivery::Delivered)
            }
        }
    }

    fn terminate_forceful(&self, pid: u32) -> ProcessResult<SignalDelivery> {
        self.signals.lock().push(("KILL", pid));
        let mut processes = self.processes.lock();
        match processes.get(&pid).copied() {
            None => Ok(SignalDelivery::NotRunning),
            Some(FakeBehaviour::Foreign) => Err(ProcessError::PermissionDenied { pid }),
            Some(FakeBehaviour::Unkillable) => Ok(SignalDelivery::Delivered),
            Some(FakeBehaviour::VanishesOnSignal) => {
                processes.remove(&pid);
                Ok(SignalDelivery::NotRunning)
            }
            Some(_) => {
                processes.remove(&pid);
                Ok(SignalDelivery::Delivered)
            }
        }
    }
}
