//! Host process table via `sysinfo`, with `/proc` CPU times on Linux.

use std::sync::{Mutex, MutexGuard, PoisonError};

use sysinfo::{Pid as SysPid, Process, ProcessRefreshKind, ProcessesToUpdate, System, ThreadKind};
use tracing::{debug, warn};

use super::{KillOutcome, ProcessInfo, ProcessInspector};
use crate::runtime::Pid;

/// Inspector over the local process table.
///
/// Holds one `System` across calls: per-process and global CPU usage are
/// deltas between successive refreshes.
pub struct HostInspector {
    system: Mutex<System>,
    #[cfg(target_os = "linux")]
    clock_ticks: f64,
}

impl HostInspector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

        Self {
            system: Mutex::new(system),
            #[cfg(target_os = "linux")]
            clock_ticks: linux::clock_ticks(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(&self, process: &Process, total_memory: u64) -> ProcessInfo {
        let pid = process.pid().as_u32();
        let cpu_percent = f64::from(process.cpu_usage());
        let memory_percent = if total_memory > 0 {
            process.memory() as f64 / total_memory as f64 * 100.0
        } else {
            0.0
        };

        ProcessInfo {
            pid,
            name: process.name().to_string_lossy().into_owned(),
            cpu_percent,
            memory_percent,
            cpu_time: self
                .cpu_time(pid)
                .unwrap_or_else(|| cpu_percent / 100.0 * process.run_time() as f64),
            create_time: process.start_time() as f64,
        }
    }

    #[cfg(target_os = "linux")]
    fn cpu_time(&self, pid: Pid) -> Option<f64> {
        linux::cpu_seconds(pid, self.clock_ticks)
    }

    #[cfg(not(target_os = "linux"))]
    fn cpu_time(&self, _pid: Pid) -> Option<f64> {
        None
    }

    #[cfg(unix)]
    fn send_term(&self, pid: Pid) -> KillOutcome {
        let raw = match libc::pid_t::try_from(pid) {
            Ok(raw) if raw > 0 => raw,
            _ => return KillOutcome::NotFound,
        };

        // SAFETY: plain syscall on a positive pid; no memory is shared.
        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc == 0 {
            return KillOutcome::Terminated;
        }
        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::ESRCH) => KillOutcome::NotFound,
            _ => KillOutcome::PermissionDenied,
        }
    }

    #[cfg(not(unix))]
    fn send_term(&self, pid: Pid) -> KillOutcome {
        let sys_pid = SysPid::from_u32(pid);
        let mut system = self.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            refresh_kind(),
        );
        match system.process(sys_pid) {
            None => KillOutcome::NotFound,
            Some(process) if process.kill() => KillOutcome::Terminated,
            Some(_) => KillOutcome::PermissionDenied,
        }
    }
}

impl Default for HostInspector {
    fn default() -> Self {
        Self::new()
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new().with_cpu().with_memory()
}

/// On Linux the table also carries every task of a multi-threaded process.
/// Kernel threads stay: they are processes in their own right.
pub(crate) fn is_userland_thread(process: &Process) -> bool {
    if matches!(process.thread_kind(), Some(ThreadKind::Userland)) {
        return true;
    }
    is_thread_id(process.pid().as_u32())
}

/// Whether `pid` currently names a non-leader thread.
#[cfg(target_os = "linux")]
pub(crate) fn is_thread_id(pid: Pid) -> bool {
    linux::thread_group(pid).is_some_and(|tgid| tgid != pid)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn is_thread_id(_pid: Pid) -> bool {
    false
}

impl ProcessInspector for HostInspector {
    fn list(&self) -> Vec<ProcessInfo> {
        let mut system = self.lock();
        system.refresh_memory();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

        let total_memory = system.total_memory();
        let procs: Vec<ProcessInfo> = system
            .processes()
            .values()
            .filter(|p| !is_userland_thread(p))
            .map(|p| self.describe(p, total_memory))
            .collect();
        debug!(count = procs.len(), "enumerated processes");
        procs
    }

    fn snapshot(&self, pid: Pid) -> Option<ProcessInfo> {
        let sys_pid = SysPid::from_u32(pid);
        let mut system = self.lock();
        system.refresh_memory();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            refresh_kind(),
        );

        let total_memory = system.total_memory();
        system
            .process(sys_pid)
            .filter(|p| !is_userland_thread(p))
            .map(|p| self.describe(p, total_memory))
    }

    fn terminate(&self, pid: Pid) -> KillOutcome {
        let outcome = self.send_term(pid);
        match outcome {
            KillOutcome::Terminated => debug!(pid, "sent termination signal"),
            KillOutcome::NotFound => debug!(pid, "terminate: no such process"),
            KillOutcome::PermissionDenied => warn!(pid, "terminate: permission denied"),
        }
        outcome
    }

    fn system_load(&self) -> f64 {
        let mut system = self.lock();
        system.refresh_cpu_usage();
        (f64::from(system.global_cpu_usage()) / 100.0).clamp(0.0, 1.0)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;

    use crate::runtime::Pid;

    pub(super) fn clock_ticks() -> f64 {
        // SAFETY: sysconf reads a constant.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks > 0 {
            ticks as f64
        } else {
            100.0
        }
    }

    /// utime + stime from `/proc/<pid>/stat`, in seconds.
    pub(super) fn cpu_seconds(pid: Pid, clock_ticks: f64) -> Option<f64> {
        let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        parse_stat_ticks(&stat).map(|ticks| ticks as f64 / clock_ticks)
    }

    /// Thread group id from `/proc/<pid>/status`; differs from `pid` for
    /// non-leader threads.
    pub(super) fn thread_group(pid: Pid) -> Option<Pid> {
        let status = fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
        parse_tgid(&status)
    }

    pub(super) fn parse_tgid(status: &str) -> Option<Pid> {
        status
            .lines()
            .find_map(|line| line.strip_prefix("Tgid:"))?
            .trim()
            .parse()
            .ok()
    }

    /// The command name may contain spaces and parentheses, so fields are
    /// counted from the last ')'.
    pub(super) fn parse_stat_ticks(stat: &str) -> Option<u64> {
        let rest = &stat[stat.rfind(')')? + 1..];
        let fields: Vec<&str> = rest.split_whitespace().collect();
        // rest starts at field 3 (state); utime and stime are fields 14 and 15.
        let utime: u64 = fields.get(11)?.parse().ok()?;
        let stime: u64 = fields.get(12)?.parse().ok()?;
        Some(utime + stime)
    }

}
