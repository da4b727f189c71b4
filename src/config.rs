use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use serde::Deserialize;

use crate::error::{NgrokError, NgrokResult};

/// Local port tunneled when no address is given
pub const DEFAULT_PORT: u16 = 3001;
/// Seconds to wait for the agent to announce its URL
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Agent config file used when none is given
pub const DEFAULT_CONFIG_PATH: &str = "/dev/null";
/// Agent program looked up on PATH
pub const DEFAULT_BINARY: &str = "ngrok";

/// Local address the agent forwards to: a bare port or `host:port`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BindAddress {
    Port(u16),
    Address(String),
}

impl BindAddress {
    /// Numeric port: the value itself, or the trailing segment of `host:port`
    pub fn port(&self) -> Option<u16> {
        match self {
            BindAddress::Port(port) => Some(*port),
            BindAddress::Address(addr) => addr.rsplit(':').next()?.trim().parse().ok(),
        }
    }
}

impl Default for BindAddress {
    fn default() -> Self {
        BindAddress::Port(DEFAULT_PORT)
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Port(port) => write!(f, "{port}"),
            BindAddress::Address(addr) => f.write_str(addr),
        }
    }
}

impl FromStr for BindAddress {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u16>() {
            Ok(port) => BindAddress::Port(port),
            Err(_) => BindAddress::Address(s.to_string()),
        })
    }
}

impl From<u16> for BindAddress {
    fn from(port: u16) -> Self {
        BindAddress::Port(port)
    }
}

impl From<&str> for BindAddress {
    fn from(addr: &str) -> Self {
        BindAddress::Address(addr.to_string())
    }
}

impl From<String> for BindAddress {
    fn from(addr: String) -> Self {
        BindAddress::Address(addr)
    }
}

/// Tunnel protocol, used as the agent subcommand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Tls,
    Tcp,
}

impl Protocol {
    /// Subcommand / `Proto:` name as the agent spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tls => "tls",
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = NgrokError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "tls" => Ok(Protocol::Tls),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(NgrokError::Config(format!(
                "Unknown protocol '{other}'. Expected one of: http, tls, tcp"
            ))),
        }
    }
}

/// Caller-supplied tunnel options. Absent fields fall back to defaults and
/// unknown keys are ignored when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TunnelOptions {
    /// Local address to expose
    #[serde(alias = "bind_address")]
    pub addr: Option<BindAddress>,
    /// Legacy alias for `addr`; wins when both are given
    pub port: Option<BindAddress>,
    /// Seconds to wait for the public URL
    #[serde(alias = "timeout_seconds")]
    pub timeout: Option<u64>,
    /// Agent config file
    #[serde(alias = "config_file")]
    pub config: Option<PathBuf>,
    /// Tunnel protocol
    #[serde(rename = "type", alias = "proto")]
    pub protocol: Option<Protocol>,
    pub region: Option<String>,
    pub host_header: Option<String>,
    pub authtoken: Option<String>,
    pub subdomain: Option<String>,
    pub hostname: Option<String>,
    pub inspect: Option<bool>,
    /// Log file for agent output; a temporary file when absent
    #[serde(alias = "log_path")]
    pub log: Option<PathBuf>,
    /// Agent program to run
    pub binary: Option<PathBuf>,
}

impl TunnelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a TOML, JSON or YAML file (format by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> NgrokResult<Self> {
        let path = path.as_ref();
        let options = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| NgrokError::Config(format!("Failed to read options file: {e}")))?
            .try_deserialize()
            .map_err(|e| NgrokError::Config(format!("Failed to parse options: {e}")))?;

        Ok(options)
    }

    /// Parse options from a JSON object
    pub fn from_json(json: &str) -> NgrokResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| NgrokError::Config(format!("Failed to parse options: {e}")))
    }

    pub fn addr(mut self, addr: impl Into<BindAddress>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(BindAddress::Port(port));
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn host_header(mut self, host_header: impl Into<String>) -> Self {
        self.host_header = Some(host_header.into());
        self
    }

    pub fn authtoken(mut self, token: impl Into<String>) -> Self {
        self.authtoken = Some(token.into());
        self
    }

    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn inspect(mut self, inspect: bool) -> Self {
        self.inspect = Some(inspect);
        self
    }

    pub fn log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log = Some(path.into());
        self
    }

    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = Some(path.into());
        self
    }

    /// Apply the `port` alias, then fill every absent field with its default
    pub fn resolve(self) -> Configuration {
        let addr = self.port.or(self.addr).unwrap_or_default();

        Configuration {
            addr,
            timeout_secs: self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            config_path: self
                .config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            protocol: self.protocol.unwrap_or_default(),
            region: self.region,
            host_header: self.host_header,
            authtoken: self.authtoken,
            subdomain: self.subdomain,
            hostname: self.hostname,
            inspect: self.inspect,
            log_path: self.log,
            binary: self.binary.unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY)),
        }
    }
}

/// Fully resolved tunnel configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub addr: BindAddress,
    pub timeout_secs: u64,
    pub config_path: PathBuf,
    pub protocol: Protocol,
    pub region: Option<String>,
    pub host_header: Option<String>,
    pub authtoken: Option<String>,
    pub subdomain: Option<String>,
    pub hostname: Option<String>,
    pub inspect: Option<bool>,
    pub log_path: Option<PathBuf>,
    pub binary: PathBuf,
}

impl Configuration {
    /// Numeric form of the bind address
    pub fn port(&self) -> Option<u16> {
        self.addr.port()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        TunnelOptions::default().resolve()
    }
}
