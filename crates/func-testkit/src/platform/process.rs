//! Platform-specific process liveness and termination.
//!
//! These operate on bare pids and never wait for the target. Callers that own
//! a child handle are expected to reap it themselves.

use crate::error::{FuncTestError, Result};
use tracing::debug;

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Unix**: `kill(pid, 0)`; `EPERM` still means the process exists
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION` and
///   an exit-code check
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        windows::is_process_alive(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        true
    }
}

/// Forcefully terminate a single process.
///
/// Returns `Ok(false)` if the process was already gone.
///
/// # Platform Behavior
/// - **Unix**: `SIGKILL`
/// - **Windows**: `TerminateProcess` with exit code `-1`, matching what the
///   runtime reports for a killed process rather than a failing one
pub fn kill_process(pid: u32) -> Result<bool> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| FuncTestError::Other(format!("Invalid process id {}", pid)))?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                debug!("Sent SIGKILL to process {}", pid);
                Ok(true)
            }
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(FuncTestError::Other(format!(
                "Failed to kill process {}: {}",
                pid, e
            ))),
        }
    }

    #[cfg(windows)]
    {
        windows::terminate_process(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        Err(FuncTestError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod windows {
    use crate::error::{FuncTestError, Result};
    use tracing::debug;
    use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
    use windows_sys::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, TerminateProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        PROCESS_TERMINATE,
    };

    pub fn is_process_alive(pid: u32) -> bool {
        // SAFETY: OpenProcess returns null on failure; the handle is closed
        // before returning and exit_code is a valid out-pointer.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code: u32 = 0;
            let ok = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);
            ok != 0 && exit_code == STILL_ACTIVE as u32
        }
    }

    pub fn terminate_process(pid: u32) -> Result<bool> {
        // SAFETY: the handle is checked for null and closed on every path.
        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                return Ok(false);
            }
            let ok = TerminateProcess(handle, u32::MAX);
            CloseHandle(handle);
            if ok == 0 {
                return Err(FuncTestError::Other(format!(
                    "TerminateProcess failed for {}: {}",
                    pid,
                    std::io::Error::last_os_error()
                )));
            }
        }
        debug!("Terminated process {}", pid);
        Ok(true)
    }
}
