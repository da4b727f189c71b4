//! ngrok-tunnel - supervise an ngrok agent from Rust
//!
//! Launches the `ngrok` binary for a local address, waits for it to announce
//! its public URL and kills it again on shutdown.
//!
//! # Features
//!
//! - http, tls and tcp tunnels
//! - Options from code, JSON or TOML/YAML files (`port` accepted as a legacy alias for `addr`)
//! - Bounded wait for the public URL with distinct errors for a missing
//!   binary, an agent-reported failure and a timeout
//! - Agents are killed on `stop`, on drop and when the host process exits
//! - Structured logging with tracing
//!
//! # Example
//!
//! ```rust,no_run
//! use ngrok_tunnel::{TunnelOptions, TunnelSupervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tunnel = TunnelSupervisor::new();
//!     let url = tunnel
//!         .start(TunnelOptions::new().addr(3000).subdomain("demo"))
//!         .await?;
//!     println!("Tunnel live at {url}");
//!
//!     tunnel.stop().await;
//!     Ok(())
//! }
//! ```

pub mod announcement;
pub mod command;
pub mod config;
pub mod error;
pub mod log_file;
pub mod poll;
pub mod process;
pub mod supervisor;

pub use announcement::PublicUrls;
pub use config::{BindAddress, Configuration, Protocol, TunnelOptions};
pub use error::{NgrokError, NgrokResult};
pub use process::{AgentLauncher, NgrokLauncher};
pub use supervisor::{TunnelStatus, TunnelSupervisor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with tracing
pub fn init_logging() -> NgrokResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ngrok_tunnel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| NgrokError::Config(e.to_string()))?;

    Ok(())
}
