use std::{io, path::Path, process::Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::{
    error::{NgrokError, NgrokResult},
    log_file::AgentLog,
};

/// Builds the base command used to run the agent program
pub trait AgentLauncher: Send + Sync {
    fn command(&self, program: &Path) -> Command;
}

/// Runs the configured agent binary directly
#[derive(Debug, Clone, Copy, Default)]
pub struct NgrokLauncher;

impl AgentLauncher for NgrokLauncher {
    fn command(&self, program: &Path) -> Command {
        Command::new(program)
    }
}

/// Check that the agent can be invoked by running `<program> version`.
///
/// Only a missing or non-executable program is an error; a nonzero exit
/// status is accepted.
pub async fn ensure_binary<L: AgentLauncher>(launcher: &L, program: &Path) -> NgrokResult<()> {
    let mut cmd = launcher.command(program);
    cmd.arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match cmd.output().await {
        Ok(output) => {
            debug!(
                "{} version exited with {}: {}",
                program.display(),
                output.status,
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Ok(())
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
            Err(NgrokError::BinaryNotFound(format!("{}: {e}", program.display())))
        }
        Err(e) => {
            warn!("Probing {} failed: {}", program.display(), e);
            Ok(())
        }
    }
}

/// A running agent subprocess owned by the supervisor
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    pid: u32,
}

impl AgentProcess {
    /// Spawn the agent with its combined output appended to `log`
    pub fn spawn<L: AgentLauncher>(
        launcher: &L,
        program: &Path,
        args: &[String],
        log: &AgentLog,
    ) -> NgrokResult<Self> {
        let stdout = log.writer()?;
        let stderr = stdout.try_clone()?;

        let mut cmd = launcher.command(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                NgrokError::BinaryNotFound(format!("{}: {e}", program.display()))
            }
            _ => NgrokError::Io(e),
        })?;
        let pid = child
            .id()
            .ok_or_else(|| NgrokError::Other("agent exited before reporting a pid".to_string()))?;

        exit_hook::register(pid);
        info!("Started agent process {}", pid);

        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Kill the agent immediately (SIGKILL) and reap it
    pub async fn terminate(mut self) {
        debug!("Terminating agent process {}", self.pid);

        if let Err(e) = self.child.kill().await {
            warn!("Error killing agent process {}: {}", self.pid, e);
        }

        match self.child.wait().await {
            Ok(status) => debug!("Agent process {} exited with status: {}", self.pid, status),
            Err(e) => error!("Error waiting for agent process {} to exit: {}", self.pid, e),
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        exit_hook::unregister(self.pid);
    }
}

/// Kills still-supervised agents when the host process exits.
mod exit_hook {
    use std::{
        collections::HashSet,
        sync::{Mutex, Once, TryLockError},
    };

    /// Pids of agents that are still owned by a supervisor
    pub(super) struct AgentRegistry {
        live: Mutex<Option<HashSet<u32>>>,
    }

    impl AgentRegistry {
        pub(super) const fn new() -> Self {
            Self {
                live: Mutex::new(None),
            }
        }

        pub(super) fn register(&self, pid: u32) {
            if let Ok(mut live) = self.live.lock() {
                live.get_or_insert_with(HashSet::new).insert(pid);
            }
        }

        pub(super) fn unregister(&self, pid: u32) {
            if let Ok(mut live) = self.live.lock()
                && let Some(set) = live.as_mut()
            {
                set.remove(&pid);
            }
        }

        #[cfg(test)]
        pub(super) fn contains(&self, pid: u32) -> bool {
            self.live
                .lock()
                .map(|live| live.as_ref().is_some_and(|set| set.contains(&pid)))
                .unwrap_or(false)
        }

        #[cfg(test)]
        pub(super) fn hold(&self) -> std::sync::MutexGuard<'_, Option<HashSet<u32>>> {
            self.live.lock().unwrap()
        }

        /// SIGKILL every registered agent. Never blocks: if the registry is
        /// locked elsewhere the kill is skipped.
        #[cfg(unix)]
        pub(super) fn kill_all(&self) {
            let mut live = match self.live.try_lock() {
                Ok(live) => live,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            if let Some(set) = live.take() {
                for pid in set {
                    // SAFETY: sending a signal has no memory-safety preconditions.
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGKILL);
                    }
                }
            }
        }
    }

    static LIVE_AGENTS: AgentRegistry = AgentRegistry::new();
    static INSTALL: Once = Once::new();

    pub(super) fn register(pid: u32) {
        INSTALL.call_once(install);
        LIVE_AGENTS.register(pid);
    }

    pub(super) fn unregister(pid: u32) {
        LIVE_AGENTS.unregister(pid);
    }

    #[cfg(test)]
    pub(super) fn is_registered(pid: u32) -> bool {
        LIVE_AGENTS.contains(pid)
    }

    #[cfg(unix)]
    fn install() {
        // SAFETY: `kill_live_agents` is a plain extern "C" fn with no captured state.
        unsafe {
            libc::atexit(kill_live_agents);
        }
    }

    #[cfg(not(unix))]
    fn install() {}

    #[cfg(unix)]
    extern "C" fn kill_live_agents() {
        LIVE_AGENTS.kill_all();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;

    use super::*;

    /// Runs a shell script in place of the agent binary
    struct ScriptLauncher(&'static str);

    impl AgentLauncher for ScriptLauncher {
        fn command(&self, _program: &Path) -> Command {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(self.0).arg("ngrok");
            cmd
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let program = PathBuf::from("/nonexistent/bin/ngrok");
        let result = ensure_binary(&NgrokLauncher, &program).await;

        assert!(matches!(result, Err(NgrokError::BinaryNotFound(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let launcher = ScriptLauncher("exit 3");
        assert!(ensure_binary(&launcher, Path::new("ngrok")).await.is_ok());
    }

    #[tokio::test]
    async fn test_spawn_writes_args_to_log_and_terminates() {
        let launcher = ScriptLauncher("echo \"args: $*\"; exec sleep 30");
        let mut log = AgentLog::open(None).unwrap();
        let args = vec!["http".to_string(), "3001".to_string()];

        let process = AgentProcess::spawn(&launcher, Path::new("ngrok"), &args, &log).unwrap();
        let pid = process.pid();
        assert!(exit_hook::is_registered(pid));

        let mut content = String::new();
        for _ in 0..50 {
            content = log.read_all().await.unwrap();
            if !content.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(content, "args: http 3001\n");

        process.terminate().await;
        assert!(!exit_hook::is_registered(pid));
    }

    #[tokio::test]
    async fn test_registry_kill_all_sigkills_agent() {
        use std::os::unix::process::ExitStatusExt;

        let launcher = ScriptLauncher("exec sleep 30");
        let log = AgentLog::open(None).unwrap();
        let mut process = AgentProcess::spawn(&launcher, Path::new("ngrok"), &[], &log).unwrap();

        // A private registry keeps agents of concurrently running tests alive
        let registry = exit_hook::AgentRegistry::new();
        registry.register(process.pid());
        registry.kill_all();
        assert!(!registry.contains(process.pid()));

        let status = process.child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));

        // Terminating an agent the hook already killed is harmless
        process.terminate().await;
    }

    #[tokio::test]
    async fn test_registry_kill_all_skips_when_locked() {
        let launcher = ScriptLauncher("exec sleep 30");
        let log = AgentLog::open(None).unwrap();
        let mut process = AgentProcess::spawn(&launcher, Path::new("ngrok"), &[], &log).unwrap();

        let registry = exit_hook::AgentRegistry::new();
        registry.register(process.pid());
        {
            let _held = registry.hold();
            registry.kill_all();
        }

        assert!(registry.contains(process.pid()));
        assert!(process.child.try_wait().unwrap().is_none());
        process.terminate().await;
    }
}
