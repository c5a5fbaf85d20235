//! Parent-process resolution.
//!
//! A single capability, "direct parent of pid P, or none", with one strategy
//! per platform family:
//! - **Linux**: `PPid:` line of `/proc/<pid>/status`
//! - **Windows**: `NtQueryInformationProcess` (`InheritedFromUniqueProcessId`)
//! - **Other Unix**: the parent pid reported by `sysinfo`
//!
//! Every failure (process gone mid-scan, access denied, unparsable status)
//! collapses into `None`.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Resolves the direct parent of a process.
pub trait ParentLookup: Send + Sync {
    /// Returns the parent pid, or `None` if it cannot be determined.
    fn parent_of(&self, pid: u32) -> Option<u32>;
}

/// All process ids currently in the OS process table.
pub fn running_pids() -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
    system.processes().keys().map(|pid| pid.as_u32()).collect()
}

/// The lookup strategy for the current platform.
pub fn platform_lookup() -> Box<dyn ParentLookup> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcStatusLookup::default())
    }

    #[cfg(windows)]
    {
        Box::new(NativeQueryLookup)
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(SysinfoLookup::snapshot())
    }
}

/// Reads the parent pid from a `status` pseudo-file under a procfs root.
#[derive(Debug, Clone)]
pub struct ProcStatusLookup {
    root: std::path::PathBuf,
}

impl Default for ProcStatusLookup {
    fn default() -> Self {
        Self {
            root: std::path::PathBuf::from("/proc"),
        }
    }
}

impl ProcStatusLookup {
    /// Use a different procfs mount point.
    pub fn with_root(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Extract the `PPid:` field from the contents of a `/proc/<pid>/status` file.
pub fn parse_status_ppid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("PPid:"))
        .and_then(|value| value.trim().parse().ok())
}

impl ParentLookup for ProcStatusLookup {
    fn parent_of(&self, pid: u32) -> Option<u32> {
        let path = self.root.join(pid.to_string()).join("status");
        let status = std::fs::read_to_string(path).ok()?;
        // PPid 0 means "no parent" (init, kernel threads).
        parse_status_ppid(&status).filter(|&ppid| ppid != 0)
    }
}

/// Parent pids captured from a single `sysinfo` refresh.
#[derive(Debug, Clone, Default)]
pub struct SysinfoLookup {
    parents: std::collections::HashMap<u32, u32>,
}

impl SysinfoLookup {
    pub fn snapshot() -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::new());
        let parents = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| Some((pid.as_u32(), process.parent()?.as_u32())))
            .collect();
        Self { parents }
    }
}

impl ParentLookup for SysinfoLookup {
    fn parent_of(&self, pid: u32) -> Option<u32> {
        self.parents.get(&pid).copied()
    }
}

/// Asks the kernel for the creator process id of each pid.
#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeQueryLookup;

#[cfg(windows)]
#[allow(unsafe_code)]
impl ParentLookup for NativeQueryLookup {
    fn parent_of(&self, pid: u32) -> Option<u32> {
        use windows_sys::Wdk::System::Threading::{NtQueryInformationProcess, ProcessBasicInformation};
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_BASIC_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // SAFETY: OpenProcess returns null when the process is gone or access
        // is denied; both mean "no parent". The info struct is plain data,
        // sized exactly as passed, and the handle is closed on every path.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return None;
            }

            let mut info: PROCESS_BASIC_INFORMATION = std::mem::zeroed();
            let mut returned: u32 = 0;
            let status = NtQueryInformationProcess(
                handle,
                ProcessBasicInformation,
                &mut info as *mut _ as *mut core::ffi::c_void,
                std::mem::size_of::<PROCESS_BASIC_INFORMATION>() as u32,
                &mut returned,
            );
            CloseHandle(handle);

            if status != 0 {
                return None;
            }
            u32::try_from(info.InheritedFromUniqueProcessId)
                .ok()
                .filter(|&ppid| ppid != 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_ppid() {
        let status = "Name:\tbash\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t4242\nPid:\t4242\nPPid:\t17\nTracerPid:\t0\n";
        assert_eq!(parse_status_ppid(status), Some(17));
        assert_eq!(parse_status_ppid("Name:\tbash\n"), None);
        assert_eq!(parse_status_ppid("PPid:\tnot-a-number\n"), None);
    }

    #[test]
    fn test_proc_status_lookup_with_fake_root() {
        let root = tempfile::TempDir::new().unwrap();
        let dir = root.path().join("100");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("status"), "Name:\tfunc\nPPid:\t42\n").unwrap();

        let init = root.path().join("1");
        std::fs::create_dir_all(&init).unwrap();
        std::fs::write(init.join("status"), "Name:\tinit\nPPid:\t0\n").unwrap();

        let lookup = ProcStatusLookup::with_root(root.path());
        assert_eq!(lookup.parent_of(100), Some(42));
        assert_eq!(lookup.parent_of(1), None);
        // Vanished process
        assert_eq!(lookup.parent_of(555), None);
    }

    #[test]
    fn test_running_pids_contains_self() {
        assert!(running_pids().contains(&std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_platform_lookup_resolves_own_parent() {
        let lookup = platform_lookup();
        let expected = nix::unistd::getppid().as_raw() as u32;
        assert_eq!(lookup.parent_of(std::process::id()), Some(expected));
    }
}
