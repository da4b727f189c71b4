use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command};
use eyre::WrapErr;
use ngrok_tunnel::{BindAddress, NgrokError, Protocol, TunnelOptions, TunnelSupervisor};
use tokio::signal;
use tracing::{error, info};

fn cli() -> Command {
    Command::new("ngrok-tunnel")
        .version(ngrok_tunnel::VERSION)
        .author("akagi201")
        .about("Run an ngrok tunnel and print its public URL")
        .arg(
            Arg::new("options")
                .short('o')
                .long("options")
                .value_name("FILE")
                .help("Options file (TOML, JSON or YAML); flags override its values"),
        )
        .arg(
            Arg::new("addr")
                .short('a')
                .long("addr")
                .value_name("ADDR")
                .help("Local port or host:port to expose [default: 3001]"),
        )
        .arg(
            Arg::new("proto")
                .short('p')
                .long("proto")
                .value_name("PROTO")
                .value_parser(["http", "tls", "tcp"])
                .help("Tunnel protocol [default: http]"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64))
                .help("Seconds to wait for the public URL [default: 10]"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("ngrok config file [default: /dev/null]"),
        )
        .arg(Arg::new("region").long("region").value_name("REGION"))
        .arg(Arg::new("host-header").long("host-header").value_name("HOST"))
        .arg(Arg::new("authtoken").long("authtoken").value_name("TOKEN"))
        .arg(Arg::new("subdomain").long("subdomain").value_name("NAME"))
        .arg(Arg::new("hostname").long("hostname").value_name("HOST"))
        .arg(
            Arg::new("inspect")
                .long("inspect")
                .value_name("BOOL")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("log")
                .short('l')
                .long("log")
                .value_name("FILE")
                .help("Write agent output here instead of a temporary file"),
        )
        .arg(
            Arg::new("binary")
                .long("binary")
                .value_name("PATH")
                .help("ngrok executable [default: ngrok on PATH]"),
        )
}

/// Merge command-line flags over the options file, if any
fn options_from(matches: &ArgMatches) -> eyre::Result<TunnelOptions> {
    let mut options = match matches.get_one::<String>("options") {
        Some(path) => TunnelOptions::from_file(path)
            .wrap_err_with(|| format!("loading options from {path}"))?,
        None => TunnelOptions::new(),
    };

    let string = |id: &str| matches.get_one::<String>(id).cloned();

    if let Some(addr) = string("addr") {
        options.port = None;
        options.addr = Some(addr.parse::<BindAddress>()?);
    }
    if let Some(proto) = string("proto") {
        options.protocol = Some(proto.parse::<Protocol>()?);
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        options.timeout = Some(*timeout);
    }
    if let Some(inspect) = matches.get_one::<bool>("inspect") {
        options.inspect = Some(*inspect);
    }
    options.config = string("config").map(PathBuf::from).or(options.config);
    options.log = string("log").map(PathBuf::from).or(options.log);
    options.binary = string("binary").map(PathBuf::from).or(options.binary);
    options.region = string("region").or(options.region);
    options.host_header = string("host-header").or(options.host_header);
    options.authtoken = string("authtoken").or(options.authtoken);
    options.subdomain = string("subdomain").or(options.subdomain);
    options.hostname = string("hostname").or(options.hostname);

    Ok(options)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Initialize logging
    ngrok_tunnel::init_logging()?;

    let matches = cli().get_matches();
    let options = options_from(&matches)?;

    let mut tunnel = TunnelSupervisor::new();
    let url = match tunnel.start(options).await {
        Ok(url) => url,
        Err(NgrokError::BinaryNotFound(detail)) => {
            error!("ngrok binary not found ({detail})");
            error!("Install it from https://ngrok.com/download and make sure it is on PATH");
            std::process::exit(127);
        }
        Err(e) => return Err(e.into()),
    };

    info!("Forwarding {} -> {}", url, tunnel.addr());
    if let Some(https) = tunnel.public_url_https().filter(|https| *https != url) {
        info!("Forwarding {} -> {}", https, tunnel.addr());
    }
    if let Some(log) = tunnel.log_path() {
        info!("Agent log: {}", log.display());
    }
    println!("{url}");

    info!("Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    let status = tunnel.stop().await;
    info!("Tunnel {}", status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_flags_map_to_options() {
        let matches = cli().get_matches_from([
            "ngrok-tunnel",
            "--addr",
            "localhost:8080",
            "--proto",
            "tcp",
            "--timeout",
            "5",
            "--inspect",
            "false",
            "--subdomain",
            "demo",
        ]);
        let config = options_from(&matches).unwrap().resolve();

        assert_eq!(config.addr, BindAddress::from("localhost:8080"));
        assert_eq!(config.port(), Some(8080));
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.inspect, Some(false));
        assert_eq!(config.subdomain.as_deref(), Some("demo"));
    }

    #[test]
    fn test_no_flags_use_defaults() {
        let matches = cli().get_matches_from(["ngrok-tunnel"]);
        let config = options_from(&matches).unwrap().resolve();

        assert_eq!(config.addr, BindAddress::Port(3001));
        assert_eq!(config.protocol, Protocol::Http);
    }
}
