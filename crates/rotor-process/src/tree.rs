//! Find and kill the transfer binary underneath its launcher shell.
//!
//! The transfer runs as `sh -c "<binary> ..."`, so the PID we hold is the
//! shell's. Depending on the shell, the binary is either its child or the
//! shell itself after an exec. Both cases are handled by matching names.

use std::ffi::OsStr;
use std::path::Path;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info};

/// Linux truncates `/proc/<pid>/comm` to this many bytes.
const COMM_MAX_LEN: usize = 15;

/// Kill every direct child of `launcher_pid` whose name matches `binary`,
/// plus the launcher itself if it matches. Returns the number of processes
/// signalled. A launcher that no longer exists yields 0.
pub fn terminate_tree(launcher_pid: u32, binary: &str) -> usize {
    let sys = snapshot();
    let launcher = Pid::from_u32(launcher_pid);
    let Some(launcher_proc) = sys.process(launcher) else {
        debug!(launcher_pid, "Launcher already gone; nothing to terminate");
        return 0;
    };

    let mut killed = 0;
    for pid in children_named(&sys, launcher, binary) {
        if let Some(process) = sys.process(pid) {
            if process.kill() {
                info!(pid = pid.as_u32(), launcher_pid, "Killed transfer process");
                killed += 1;
            }
        }
    }

    if name_matches(launcher_proc.name(), binary) && launcher_proc.kill() {
        info!(launcher_pid, "Killed launcher running the transfer binary");
        killed += 1;
    }
    killed
}

/// PIDs of direct children of `launcher_pid` named like `binary`.
pub fn matching_children(launcher_pid: u32, binary: &str) -> Vec<u32> {
    let sys = snapshot();
    let mut pids: Vec<u32> = children_named(&sys, Pid::from_u32(launcher_pid), binary)
        .into_iter()
        .map(Pid::as_u32)
        .collect();
    pids.sort_unstable();
    pids
}

/// Whether `pid` refers to an existing process (zombies included).
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill() with signal 0 is a pure existence/permission probe.
    let ret = unsafe { libc::kill(raw, 0) };
    ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn snapshot() -> System {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    sys
}

fn children_named(sys: &System, parent: Pid, binary: &str) -> Vec<Pid> {
    sys.processes()
        .iter()
        .filter(|(_, p)| p.thread_kind().is_none())
        .filter(|(_, p)| p.parent() == Some(parent))
        .filter(|(_, p)| name_matches(p.name(), binary))
        .map(|(pid, _)| *pid)
        .collect()
}

/// Compare a process name against the basename of `binary`, accepting the
/// kernel's truncated comm for long names.
fn name_matches(name: &OsStr, binary: &str) -> bool {
    let expected = Path::new(binary)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(binary);
    let name = name.to_string_lossy();
    if expected.is_empty() || name.is_empty() {
        return false;
    }
    name == expected || (name.len() == COMM_MAX_LEN && expected.starts_with(name.as_ref()))
}
