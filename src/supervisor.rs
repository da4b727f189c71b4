use std::{fmt, path::Path, sync::OnceLock, time::Duration};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    announcement::{PublicUrls, parse_failure, parse_public_urls},
    command::{build_args, build_command_string},
    config::{BindAddress, Configuration, Protocol, TunnelOptions},
    error::{NgrokError, NgrokResult},
    log_file::AgentLog,
    poll::{PollSchedule, Sleeper, TokioSleeper},
    process::{AgentLauncher, AgentProcess, NgrokLauncher, ensure_binary},
};

/// Delay between reads of the agent log
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle state of the supervised tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelStatus {
    Stopped,
    Running,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelStatus::Stopped => f.write_str("stopped"),
            TunnelStatus::Running => f.write_str("running"),
        }
    }
}

/// The live agent and everything it owns
#[derive(Debug)]
struct Session {
    process: AgentProcess,
    log: AgentLog,
    urls: Option<PublicUrls>,
}

/// Supervises a single ngrok agent process.
///
/// `start` spawns the agent and waits for it to announce its public URL;
/// `stop` kills it. Mutating calls take `&mut self`, so one supervisor never
/// sees racing `start`/`stop` calls. Use [`TunnelSupervisor::global`] for a
/// process-wide instance.
pub struct TunnelSupervisor<L = NgrokLauncher, S = TokioSleeper> {
    launcher: L,
    sleeper: S,
    poll_interval: Duration,
    config: Configuration,
    status: TunnelStatus,
    session: Option<Session>,
}

impl TunnelSupervisor {
    pub fn new() -> Self {
        Self::with_parts(NgrokLauncher, TokioSleeper)
    }

    /// Process-wide supervisor shared by all callers
    pub fn global() -> &'static Mutex<TunnelSupervisor> {
        static GLOBAL: OnceLock<Mutex<TunnelSupervisor>> = OnceLock::new();
        GLOBAL.get_or_init(|| Mutex::new(TunnelSupervisor::new()))
    }
}

impl Default for TunnelSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: AgentLauncher, S: Sleeper> TunnelSupervisor<L, S> {
    /// Create a supervisor with a custom launcher and sleeper
    pub fn with_parts(launcher: L, sleeper: S) -> Self {
        Self {
            launcher,
            sleeper,
            poll_interval: DEFAULT_POLL_INTERVAL,
            config: Configuration::default(),
            status: TunnelStatus::Stopped,
            session: None,
        }
    }

    /// Override the delay between log reads
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the tunnel and return its public URL.
    ///
    /// While already running this does not spawn again: the new options are
    /// stored and the current URL is returned.
    pub async fn start(&mut self, options: TunnelOptions) -> NgrokResult<String> {
        let config = options.resolve();
        ensure_binary(&self.launcher, &config.binary).await?;
        self.config = config;

        if self.is_stopped() {
            info!(
                "Starting ngrok {} tunnel to {}",
                self.config.protocol, self.config.addr
            );
            self.launch().await?;
            self.status = TunnelStatus::Running;
            info!("Tunnel started");
        } else {
            debug!("Tunnel already running; keeping the live process");
        }

        self.public_url()
            .map(str::to_string)
            .ok_or_else(|| NgrokError::Other("tunnel is running without a public url".to_string()))
    }

    /// Kill the agent if one is running and return the resulting status
    pub async fn stop(&mut self) -> TunnelStatus {
        if let Some(session) = self.session.take() {
            info!("Stopping agent process {}", session.process.pid());
            session.process.terminate().await;
        }
        self.status = TunnelStatus::Stopped;
        self.status
    }

    async fn launch(&mut self) -> NgrokResult<()> {
        let log = AgentLog::open(self.config.log_path.as_deref())?;
        let args = build_args(&self.config);
        debug!("{}", build_command_string(&self.config, log.path()));

        let process = AgentProcess::spawn(&self.launcher, &self.config.binary, &args, &log)?;
        let session = self.session.insert(Session {
            process,
            log,
            urls: None,
        });

        let discovered = wait_for_urls(
            &mut session.log,
            self.config.protocol,
            self.config.timeout_secs,
            self.poll_interval,
            &self.sleeper,
        )
        .await;

        match discovered {
            Ok(urls) => {
                info!("Tunnel is live at {}", urls.url);
                session.urls = Some(urls);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start tunnel: {}", e);
                self.stop().await;
                Err(e)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TunnelStatus::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.status == TunnelStatus::Stopped
    }

    pub fn status(&self) -> TunnelStatus {
        self.status
    }

    /// Configuration from the most recent `start`
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn addr(&self) -> &BindAddress {
        &self.config.addr
    }

    pub fn port(&self) -> Option<u16> {
        self.config.port()
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn subdomain(&self) -> Option<&str> {
        self.config.subdomain.as_deref()
    }

    pub fn authtoken(&self) -> Option<&str> {
        self.config.authtoken.as_deref()
    }

    /// Log file of the live agent
    pub fn log_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.log.path())
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.process.pid())
    }

    pub fn public_url(&self) -> Option<&str> {
        self.urls().map(|urls| urls.url.as_str())
    }

    pub fn public_url_https(&self) -> Option<&str> {
        self.urls().and_then(|urls| urls.url_https.as_deref())
    }

    fn urls(&self) -> Option<&PublicUrls> {
        self.session.as_ref().and_then(|s| s.urls.as_ref())
    }
}

/// Poll the agent log until it announces a URL, reports a failure, or
/// `timeout_secs` attempts pass.
async fn wait_for_urls<S: Sleeper>(
    log: &mut AgentLog,
    protocol: Protocol,
    timeout_secs: u64,
    interval: Duration,
    sleeper: &S,
) -> NgrokResult<PublicUrls> {
    let max_attempts = u32::try_from(timeout_secs).unwrap_or(u32::MAX);
    let mut schedule = PollSchedule::new(sleeper, max_attempts, interval);

    while schedule.next_attempt().await {
        let content = log.read_all().await?;

        if let Some(urls) = parse_public_urls(&content, protocol) {
            return Ok(urls);
        }

        if let Some(reason) = parse_failure(&content) {
            warn!("Agent reported failure: {}", reason);
            return Err(NgrokError::Tunnel(reason));
        }

        debug!(
            "No announcement yet (attempt {}/{})",
            schedule.attempts(),
            max_attempts
        );
    }

    Err(NgrokError::FetchUrl { timeout_secs })
}
