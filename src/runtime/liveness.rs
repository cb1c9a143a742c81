//! Liveness checks for processes that dropped out of an enumeration pass.
//!
//! A missing pid is ambiguous: the process may have exited, its pid may have
//! been recycled, or it may simply be invisible to us (filtered out upstream,
//! or hidden by permissions). The oracle answers with a three-valued
//! [`Liveness`] so the store's policy stays total.

use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

use super::record::Pid;
use crate::inspect::host::{is_thread_id, is_userland_thread};

/// Result of a single liveness check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Liveness {
    /// A process with this pid exists and was created at `creation_time`.
    StillAlive { creation_time: f64 },
    /// No process with this pid exists.
    Gone,
    /// Existence could not be established (e.g. insufficient privilege).
    Indeterminate,
}

/// Answers "does this pid still exist, and since when?".
///
/// Implementations must fold every failure of the check itself into
/// [`Liveness::Indeterminate`]. A permission error is never `Gone`.
pub trait LivenessOracle: Send + Sync {
    fn check(&self, pid: Pid) -> Liveness;
}

/// Oracle backed by the host process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOracle;

impl HostOracle {
    pub fn new() -> Self {
        Self
    }
}

impl LivenessOracle for HostOracle {
    fn check(&self, pid: Pid) -> Liveness {
        // Pids and tids share one number space: a thread holding this id
        // means the tracked process is gone.
        if is_thread_id(pid) {
            debug!(pid, "pid now names a thread");
            return Liveness::Gone;
        }

        let sys_pid = SysPid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::new(),
        );

        if let Some(process) = system.process(sys_pid) {
            if is_userland_thread(process) {
                return Liveness::Gone;
            }
            return Liveness::StillAlive {
                creation_time: process.start_time() as f64,
            };
        }

        let verdict = signal_probe(pid);
        debug!(pid, ?verdict, "process missing from table, probed with signal 0");
        verdict
    }
}

/// `kill(pid, 0)` performs the existence and permission checks without
/// delivering anything.
#[cfg(unix)]
fn signal_probe(pid: Pid) -> Liveness {
    // pid 0 addresses our own process group, not a process.
    let raw = match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return Liveness::Indeterminate,
    };

    // SAFETY: signal 0 delivers nothing; kill only validates the target.
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        // Exists, but the table could not describe it.
        return Liveness::Indeterminate;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Liveness::Gone,
        _ => Liveness::Indeterminate,
    }
}

#[cfg(not(unix))]
fn signal_probe(_pid: Pid) -> Liveness {
    Liveness::Gone
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let oracle = HostOracle::new();
        match oracle.check(std::process::id()) {
            Liveness::StillAlive { creation_time } => assert!(creation_time > 0.0),
            other => panic!("expected StillAlive, got {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unused_pid_is_gone() {
        // Above the kernel's pid_max ceiling (2^22), so never allocated.
        let oracle = HostOracle::new();
        assert_eq!(oracle.check(999_999_999), Liveness::Gone);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_thread_id_is_not_alive_process() {
        let (tid_tx, tid_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            // SAFETY: gettid has no preconditions.
            let tid = unsafe { libc::syscall(libc::SYS_gettid) } as Pid;
            tid_tx.send(tid).unwrap();
            let _ = stop_rx.recv();
        });

        let tid = tid_rx.recv().unwrap();
        assert_eq!(HostOracle::new().check(tid), Liveness::Gone);

        stop_tx.send(()).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_pid_zero_is_indeterminate_when_untracked() {
        let oracle = HostOracle::new();
        assert_ne!(oracle.check(0), Liveness::Gone);
    }
}
