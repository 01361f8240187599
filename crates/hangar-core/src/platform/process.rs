//! Platform-specific process management.
//!
//! Cross-platform abstractions for checking process status and terminating
//! process trees.

use crate::{HangarError, Result};
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `kill(pid, 0)` signal check
/// - **Windows**: Uses `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: kill with signal 0 performs a permission/existence check
        // only; no signal is delivered.
        #[allow(unsafe_code)]
        unsafe {
            libc::kill(pid as i32, 0) == 0
        }
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // SAFETY: OpenProcess returns null on failure; the handle is closed
        // immediately after the query.
        #[allow(unsafe_code)]
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if !handle.is_null() {
                CloseHandle(handle);
                true
            } else {
                false
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

/// Terminate a process and its children, gracefully then forcefully.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM, waits up to `timeout_ms`, then SIGKILL
///   if still running; reaps the zombie so the process table stays clean
/// - **Windows**: Uses `taskkill /PID {pid} /F /T` (handles the tree)
///
/// Returns `true` if the process terminated (or wasn't running).
pub fn terminate_process_tree(pid: u32, timeout_ms: u64) -> Result<bool> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::sys::wait::{waitpid, WaitPidFlag};
        use nix::unistd::Pid;
        use std::thread::sleep;
        use std::time::Duration;

        if !is_process_alive(pid) {
            debug!("Process {} is not running", pid);
            // Try to reap in case it's a zombie we haven't reaped yet
            let _ = waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG));
            return Ok(true);
        }

        let nix_pid = Pid::from_raw(pid as i32);

        // We kill the process directly rather than its group: the PID may
        // not be a group leader, and killpg on a non-leader targets the
        // wrong group.
        debug!("Sending SIGTERM to process {}", pid);
        if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
            if e == nix::errno::Errno::ESRCH {
                return Ok(true);
            }
            warn!("Failed to send SIGTERM to {}: {}", pid, e);
        }

        // Wait for graceful termination
        let wait_interval = Duration::from_millis(100);
        let iterations = (timeout_ms / 100).max(1);

        for _ in 0..iterations {
            sleep(wait_interval);
            let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
            if !is_process_alive(pid) {
                debug!("Process {} terminated gracefully", pid);
                return Ok(true);
            }
        }

        // Process still running, use SIGKILL
        debug!("Process {} still running, sending SIGKILL", pid);
        if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
            if e == nix::errno::Errno::ESRCH {
                return Ok(true);
            }
            return Err(HangarError::Other(format!(
                "Failed to kill process {}: {}",
                pid, e
            )));
        }

        sleep(Duration::from_millis(100));

        // Reap the zombie: waitpid collects the exit status and removes it
        // from the process table. Without this is_process_alive keeps
        // returning true for the corpse.
        match waitpid(nix_pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                debug!("Reaped process {}: {:?}", pid, status);
            }
            Err(e) => {
                // ECHILD means we're not the parent; init will reap it
                if e != nix::errno::Errno::ECHILD {
                    debug!("waitpid({}) failed: {} (this is usually OK)", pid, e);
                }
            }
        }

        Ok(!is_process_alive(pid))
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_process_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(HangarError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

#[cfg(windows)]
fn terminate_process_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    // taskkill /F (force) /T (tree - kill child processes too)
    debug!("Terminating process {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| HangarError::Other(format!("Failed to run taskkill: {}", e)))?;

    if output.status.success() {
        debug!("Process {} terminated successfully", pid);
        Ok(true)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // "not found" errors are OK - process already dead
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(true)
        } else {
            warn!("taskkill failed for {}: {}", pid, stderr);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        let pid = std::process::id();
        assert!(is_process_alive(pid));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
    }

    #[test]
    fn test_terminate_nonexistent() {
        let result = terminate_process_tree(4_000_000_000, 500);
        assert!(result.is_ok());
        assert!(result.unwrap());
    }
}
