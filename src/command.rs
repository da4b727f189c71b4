use std::path::Path;

use crate::config::Configuration;

/// Build the agent argument vector for a resolved configuration.
///
/// Layout: `<proto> -log=stdout -log-level=debug [flags...] -config=<path> <addr>`.
/// Optional flags appear only when supplied, always in the same order.
pub fn build_args(config: &Configuration) -> Vec<String> {
    let mut args = vec![
        config.protocol.as_str().to_string(),
        "-log=stdout".to_string(),
        "-log-level=debug".to_string(),
    ];

    if let Some(region) = &config.region {
        args.push(format!("-region={region}"));
    }
    if let Some(host_header) = &config.host_header {
        args.push(format!("-host-header={host_header}"));
    }
    if let Some(token) = &config.authtoken {
        args.push(format!("-authtoken={token}"));
    }
    if let Some(subdomain) = &config.subdomain {
        args.push(format!("-subdomain={subdomain}"));
    }
    if let Some(hostname) = &config.hostname {
        args.push(format!("-hostname={hostname}"));
    }
    if let Some(inspect) = config.inspect {
        args.push(format!("-inspect={inspect}"));
    }

    args.push(format!("-config={}", config.config_path.display()));
    args.push(config.addr.to_string());

    args
}

/// Shell-equivalent command line for logging/debugging, with the auth token masked
pub fn build_command_string(config: &Configuration, log_path: &Path) -> String {
    let mut parts = vec!["exec".to_string(), config.binary.display().to_string()];
    parts.extend(build_args(config).into_iter().map(|arg| {
        if arg.starts_with("-authtoken=") {
            "-authtoken=***".to_string()
        } else {
            arg
        }
    }));
    parts.push(">".to_string());
    parts.push(log_path.display().to_string());

    parts.join(" ")
}
