//! Detached child-process supervision.
//!
//! Owns the lifetime of a launched package process: spawns it detached
//! from the caller's process group, streams its merged console output
//! through the readiness parser on a single consumer task, and handles
//! shutdown with a bounded kill escalation.

use crate::config::ProcessConfig;
use crate::platform;
use crate::process::console::ConsoleOutputParser;
use crate::{HangarError, Result};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle states of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    /// Terminated on its own with the captured exit code.
    Exited(Option<i32>),
    /// Terminated by a stop request.
    Killed,
}

/// Events surfaced to the caller.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// One line of console output (stdout or stderr).
    Output(String),
    /// The readiness phrase matched; the service is reachable at `url`.
    Ready { url: String },
    /// The process ended.
    Exited { code: Option<i32> },
}

/// Supervises one detached child process.
pub struct ProcessSupervisor {
    package_name: String,
    pid: u32,
    state: Arc<Mutex<ProcessState>>,
    kill_requested: Arc<AtomicBool>,
    monitor: Option<tokio::task::JoinHandle<()>>,
}

impl ProcessSupervisor {
    /// Launch `command` as a detached child.
    ///
    /// Console output and lifecycle events are delivered through `events`;
    /// lines pass through `parser` in order on a single consumer task so
    /// the readiness state machine sees them exactly as printed.
    pub fn launch(
        package_name: impl Into<String>,
        mut command: Command,
        mut parser: ConsoleOutputParser,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<Self> {
        let package_name = package_name.into();

        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        // Detach the child so it survives in its own session/process group
        // and killing it never takes the caller down with it.
        #[cfg(unix)]
        {
            // SAFETY: setsid() is async-signal-safe; the child becomes a
            // session leader and is adopted by init once we stop tracking
            // it.
            #[allow(unsafe_code)]
            unsafe {
                command.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let mut child = command.spawn().map_err(|e| HangarError::LaunchFailed {
            package: package_name.clone(),
            message: format!("failed to spawn process: {}", e),
        })?;

        let pid = child.id().ok_or_else(|| HangarError::LaunchFailed {
            package: package_name.clone(),
            message: "process exited before a PID was available".to_string(),
        })?;

        info!("Launched {} with PID {}", package_name, pid);

        let state = Arc::new(Mutex::new(ProcessState::Running));
        let kill_requested = Arc::new(AtomicBool::new(false));

        // Funnel stdout and stderr into one channel; each stream keeps its
        // own ordering and the consumer below is the only reader.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
        if let Some(stdout) = child.stdout.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(line_tx);

        let monitor_state = state.clone();
        let monitor_kill = kill_requested.clone();
        let monitor_name = package_name.clone();
        let monitor = tokio::spawn(async move {
            // Drain output until both pipes close. The pipes outlive the
            // process only as long as buffered data remains, so this also
            // lets the caller read the tail of a failing process's stderr
            // before the exit event fires.
            while let Some(line) = line_rx.recv().await {
                if let Some(ready) = parser.process_line(&line) {
                    let _ = events.send(ProcessEvent::Ready { url: ready.url });
                }
                let _ = events.send(ProcessEvent::Output(line));
            }

            // Pipes closed: collect the exit status.
            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("wait() failed for {}: {}", monitor_name, e);
                    None
                }
            };

            let final_state = if monitor_kill.load(Ordering::SeqCst) {
                ProcessState::Killed
            } else {
                ProcessState::Exited(exit_code)
            };

            debug!(
                "{} monitor finished: {:?} (exit code {:?})",
                monitor_name, final_state, exit_code
            );
            *monitor_state.lock().unwrap() = final_state;
            let _ = events.send(ProcessEvent::Exited { code: exit_code });
        });

        Ok(Self {
            package_name,
            pid,
            state,
            kill_requested,
            monitor: Some(monitor),
        })
    }

    /// The child's PID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Stop the process: terminate the tree, wait out the grace period,
    /// escalate to a forced kill.
    ///
    /// Always transitions to `Killed` within the shutdown budget. A child
    /// that somehow survives the forced kill yields `ShutdownTimeout`,
    /// which callers log and tolerate — shutdown never hangs indefinitely.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            debug!("{} is not running, nothing to stop", self.package_name);
            return Ok(());
        }

        info!("Stopping {} (PID {})", self.package_name, self.pid);
        self.kill_requested.store(true, Ordering::SeqCst);

        let pid = self.pid;
        let grace_ms = ProcessConfig::SHUTDOWN_GRACE.as_millis() as u64;
        let terminate = tokio::task::spawn_blocking(move || {
            platform::terminate_process_tree(pid, grace_ms)
        });

        let terminated = match tokio::time::timeout(ProcessConfig::SHUTDOWN_BUDGET, terminate).await
        {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!("Terminate of {} reported error: {}", self.package_name, e);
                false
            }
            Ok(Err(join_err)) => {
                warn!("Terminate task for {} panicked: {}", self.package_name, join_err);
                false
            }
            Err(_) => {
                warn!(
                    "Terminate of {} exceeded the shutdown budget",
                    self.package_name
                );
                false
            }
        };

        // Wait briefly for the monitor to observe the exit and emit the
        // final event; it is aborted on drop either way.
        if let Some(monitor) = self.monitor.take() {
            match tokio::time::timeout(ProcessConfig::SHUTDOWN_GRACE, monitor).await {
                Ok(_) => {}
                Err(_) => debug!("Monitor for {} still draining output", self.package_name),
            }
        }

        *self.state.lock().unwrap() = ProcessState::Killed;

        if !terminated && platform::is_process_alive(pid) {
            let err = HangarError::ShutdownTimeout {
                pid,
                timeout_ms: ProcessConfig::SHUTDOWN_BUDGET.as_millis() as u64,
            };
            warn!("{}", err);
            return Err(err);
        }

        Ok(())
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        // The monitor task is owned by the supervisor: no work may outlive
        // its owner.
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}
