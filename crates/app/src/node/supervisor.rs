//! Node daemon supervisor - owns the lifecycle of the local storage node
//!
//! Responsibilities:
//! - Terminate stray node processes left behind by a crashed instance
//! - Clean up the repository/datastore lock files and the pid-file
//! - Spawn the daemon and await its readiness marker on stdout
//! - Graceful-then-forced shutdown
//!
//! Exactly one supervised daemon exists per running instance. Recovery from a
//! previous crash relies on the OS-level process scan plus lock cleanup, not
//! on in-memory state; `start` and `stop` are serialized behind one mutex
//! because they manipulate the same lock files and pid-file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use sysinfo::{Pid, Signal, System};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Line on the daemon's stdout that signals readiness
pub const READY_MARKER: &str = "Daemon is ready";
/// Routing mode the daemon is always started with
const ROUTING_FLAG: &str = "--routing=dhtclient";
/// Lock files inside the node repository, removed before every spawn
const REPO_LOCK: &str = "repo.lock";
const DATASTORE_LOCK: &str = "datastore/LOCK";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Node binary; its file name is also the process-scan target
    pub binary: String,
    /// Node repository directory holding the lock files
    pub repo_dir: PathBuf,
    pub pid_file: PathBuf,
    /// When false the daemon is started with `--offline`
    pub allow_online: bool,
    pub startup_timeout: Duration,
    /// Grace period after SIGTERM before stray processes are force-killed
    pub kill_timeout: Duration,
    /// Pause between lock cleanup and spawn, letting the OS release handles
    pub cleanup_wait: Duration,
    /// Grace period for the supervised daemon on shutdown
    pub shutdown_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("node daemon is already running under this supervisor")]
    AlreadyRunning,
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("node daemon exited before becoming ready ({status}): {stderr}")]
    ExitedBeforeReady { status: String, stderr: String },
    #[error("node daemon not ready after {after:?}: {stderr}")]
    StartupTimeout { after: Duration, stderr: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supervises the single local node daemon process
pub struct NodeSupervisor {
    config: SupervisorConfig,
    /// Tracked child; the mutex serializes start/stop
    child: Mutex<Option<Child>>,
}

impl NodeSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    /// Start the daemon and wait for it to become ready
    ///
    /// Sequence: terminate strays, delete stale lock/pid files, wait the
    /// cleanup interval, spawn, persist the pid, await the readiness marker.
    /// On timeout or early exit the spawned process is killed and the error
    /// carries whatever the daemon wrote to stderr.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Err(SupervisorError::AlreadyRunning);
        }

        self.terminate_strays().await;
        self.cleanup_files();
        tokio::time::sleep(self.config.cleanup_wait).await;

        let mut command = Command::new(&self.config.binary);
        command.arg("daemon");
        if !self.config.allow_online {
            command.arg("--offline");
        }
        command.arg(ROUTING_FLAG);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(binary = %self.config.binary, online = self.config.allow_online, "spawning node daemon");
        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            binary: self.config.binary.clone(),
            source,
        })?;

        if let Some(pid) = child.id() {
            std::fs::write(&self.config.pid_file, pid.to_string())?;
        }

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        // Stderr output is not fatal by itself; collect it so it can be
        // attached to a startup failure.
        let stderr_collector = tokio::spawn(async move {
            let mut buffer = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut buffer).await;
            buffer
        });

        let mut lines = BufReader::new(stdout).lines();
        let ready = timeout(self.config.startup_timeout, async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        tracing::debug!(line = %line, "node daemon output");
                        if line.contains(READY_MARKER) {
                            return true;
                        }
                    }
                    // EOF or a broken pipe: the daemon exited before ready.
                    Ok(None) | Err(_) => return false,
                }
            }
        })
        .await;

        match ready {
            Ok(true) => {
                // Keep draining stdout so the daemon never blocks on a full
                // pipe.
                tokio::spawn(async move {
                    while let Ok(Some(_)) = lines.next_line().await {}
                });
                tracing::info!("node daemon ready");
                *slot = Some(child);
                Ok(())
            }
            Ok(false) => {
                let status = match child.wait().await {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                };
                let stderr = stderr_collector.await.unwrap_or_default();
                let _ = std::fs::remove_file(&self.config.pid_file);
                Err(SupervisorError::ExitedBeforeReady {
                    status,
                    stderr: stderr.trim().to_string(),
                })
            }
            Err(_) => {
                tracing::error!(
                    timeout = ?self.config.startup_timeout,
                    "node daemon startup timed out, killing"
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                let stderr = stderr_collector.await.unwrap_or_default();
                let _ = std::fs::remove_file(&self.config.pid_file);
                Err(SupervisorError::StartupTimeout {
                    after: self.config.startup_timeout,
                    stderr: stderr.trim().to_string(),
                })
            }
        }
    }

    /// Stop the supervised daemon
    ///
    /// Graceful termination first, force-kill after the shutdown timeout,
    /// then the same lock/pid cleanup as at start. A no-op when nothing is
    /// tracked.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut slot = self.child.lock().await;
        let Some(mut child) = slot.take() else {
            return Ok(());
        };

        if let Some(pid) = child.id() {
            send_term(pid);
        }

        match timeout(self.config.shutdown_timeout, child.wait()).await {
            Ok(status) => {
                tracing::info!(status = ?status.ok(), "node daemon stopped");
            }
            Err(_) => {
                tracing::warn!("node daemon ignored SIGTERM, killing");
                let _ = child.kill().await;
            }
        }

        self.cleanup_files();
        Ok(())
    }

    /// Whether a daemon is currently tracked
    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// SIGTERM every process that looks like the node binary, wait the kill
    /// grace period, then SIGKILL survivors
    async fn terminate_strays(&self) {
        let target = binary_file_name(&self.config.binary);
        let own_pid = sysinfo::get_current_pid().ok();

        let mut system = System::new();
        system.refresh_processes();

        let strays: Vec<Pid> = system
            .processes()
            .iter()
            .filter(|(pid, process)| Some(**pid) != own_pid && process.name() == target)
            .map(|(pid, _)| *pid)
            .collect();
        if strays.is_empty() {
            return;
        }

        tracing::info!(count = strays.len(), binary = %target, "terminating stray node processes");
        for pid in &strays {
            if let Some(process) = system.process(*pid) {
                if process.kill_with(Signal::Term).is_none() {
                    process.kill();
                }
            }
        }

        tokio::time::sleep(self.config.kill_timeout).await;

        system.refresh_processes();
        for pid in &strays {
            if let Some(process) = system.process(*pid) {
                tracing::warn!(pid = %pid, "stray node process survived SIGTERM, killing");
                process.kill();
            }
        }
    }

    /// Delete the lock files and the pid-file; absence is not an error
    fn cleanup_files(&self) {
        let paths = [
            self.config.repo_dir.join(REPO_LOCK),
            self.config.repo_dir.join(DATASTORE_LOCK),
            self.config.pid_file.clone(),
        ];
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove stale file")
                }
            }
        }
    }
}

fn binary_file_name(binary: &str) -> String {
    Path::new(binary)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| binary.to_string())
}

fn send_term(pid: u32) {
    let mut system = System::new();
    system.refresh_processes();
    if let Some(process) = system.process(Pid::from_u32(pid)) {
        if process.kill_with(Signal::Term).is_none() {
            process.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use crate::testutil::fake_binary;

    fn config(binary: &Path, repo_dir: &Path, pid_file: &Path) -> SupervisorConfig {
        SupervisorConfig {
            binary: binary.display().to_string(),
            repo_dir: repo_dir.to_path_buf(),
            pid_file: pid_file.to_path_buf(),
            allow_online: true,
            startup_timeout: Duration::from_secs(10),
            kill_timeout: Duration::from_millis(200),
            cleanup_wait: Duration::from_millis(50),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_start_succeeds_when_marker_appears_before_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(
            dir.path(),
            "loglink-test-node-ready",
            "#!/bin/sh\nsleep 0.2\necho 'Daemon is ready'\nsleep 60\n",
        );
        let supervisor = NodeSupervisor::new(config(&binary, dir.path(), &dir.path().join("node.pid")));

        supervisor.start().await.unwrap();
        assert!(supervisor.is_running().await);
        assert!(dir.path().join("node.pid").exists());

        supervisor.stop().await.unwrap();
        assert!(!supervisor.is_running().await);
        assert!(!dir.path().join("node.pid").exists());
    }

    #[tokio::test]
    async fn test_start_times_out_when_marker_never_appears() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(
            dir.path(),
            "loglink-test-node-silent",
            "#!/bin/sh\nsleep 30\n",
        );
        let mut cfg = config(&binary, dir.path(), &dir.path().join("node.pid"));
        cfg.startup_timeout = Duration::from_millis(500);
        let supervisor = NodeSupervisor::new(cfg);

        match supervisor.start().await {
            Err(SupervisorError::StartupTimeout { .. }) => {}
            other => panic!("expected startup timeout, got {:?}", other),
        }
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn test_early_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(
            dir.path(),
            "loglink-test-node-crash",
            "#!/bin/sh\necho 'repo is corrupt' >&2\nexit 3\n",
        );
        let supervisor = NodeSupervisor::new(config(&binary, dir.path(), &dir.path().join("node.pid")));

        match supervisor.start().await {
            Err(SupervisorError::ExitedBeforeReady { stderr, .. }) => {
                assert!(stderr.contains("repo is corrupt"));
            }
            other => panic!("expected early-exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_removes_stale_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("datastore")).unwrap();
        std::fs::write(repo.join("repo.lock"), "stale").unwrap();
        std::fs::write(repo.join("datastore/LOCK"), "stale").unwrap();

        let binary = fake_binary(
            dir.path(),
            "loglink-test-node-locks",
            "#!/bin/sh\necho 'Daemon is ready'\nsleep 60\n",
        );
        let supervisor = NodeSupervisor::new(config(&binary, &repo, &dir.path().join("node.pid")));

        supervisor.start().await.unwrap();
        assert!(!repo.join("repo.lock").exists());
        assert!(!repo.join("datastore/LOCK").exists());

        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("never-spawned");
        let supervisor = NodeSupervisor::new(config(&binary, dir.path(), &dir.path().join("node.pid")));

        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(
            dir.path(),
            "loglink-test-node-double",
            "#!/bin/sh\necho 'Daemon is ready'\nsleep 60\n",
        );
        let supervisor = NodeSupervisor::new(config(&binary, dir.path(), &dir.path().join("node.pid")));

        supervisor.start().await.unwrap();
        assert!(matches!(
            supervisor.start().await,
            Err(SupervisorError::AlreadyRunning)
        ));
        supervisor.stop().await.unwrap();
    }
}
