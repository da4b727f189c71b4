//! Scraping of agent log output for tunnel announcements.
//!
//! The agent logs `URL:<url> Proto:<proto>` once a tunnel is live and
//! `msg="command failed" err="<reason>"` when startup fails.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;

use crate::config::Protocol;

static HTTP_ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| announcement_regex("http|https"));
static TLS_ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| announcement_regex("tls"));
static TCP_ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| announcement_regex("tcp"));

static COMMAND_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"msg="command failed" err="([^"]+)""#).expect("valid failure pattern")
});

fn announcement_regex(protos: &str) -> Regex {
    Regex::new(&format!(r"URL:(.+)\sProto:({protos})\s")).expect("valid announcement pattern")
}

fn pattern_for(protocol: Protocol) -> &'static Regex {
    match protocol {
        Protocol::Http => &*HTTP_ANNOUNCEMENT,
        Protocol::Tls => &*TLS_ANNOUNCEMENT,
        Protocol::Tcp => &*TCP_ANNOUNCEMENT,
    }
}

/// Public endpoints announced by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrls {
    /// Primary endpoint; scheme follows the tunnel protocol
    pub url: String,
    /// HTTPS endpoint of an http tunnel; same as `url` for tls and tcp
    pub url_https: Option<String>,
}

/// Resolve the public endpoints from accumulated log text.
///
/// Returns `None` until the primary slot is filled. For http that means an
/// `http` announcement; an `https` one on its own is not enough. Later
/// announcements for the same proto replace earlier ones.
pub fn parse_public_urls(log: &str, protocol: Protocol) -> Option<PublicUrls> {
    let mut by_proto: HashMap<&str, &str> = HashMap::new();
    for caps in pattern_for(protocol).captures_iter(log) {
        if let (Some(url), Some(proto)) = (caps.get(1), caps.get(2)) {
            by_proto.insert(proto.as_str(), url.as_str().trim());
        }
    }

    match protocol {
        Protocol::Http => {
            let url = by_proto.get("http")?;
            Some(PublicUrls {
                url: url.to_string(),
                url_https: by_proto.get("https").map(|u| u.to_string()),
            })
        }
        Protocol::Tls | Protocol::Tcp => {
            let url = by_proto.get(protocol.as_str())?;
            Some(PublicUrls {
                url: url.to_string(),
                url_https: Some(url.to_string()),
            })
        }
    }
}

/// Reason text of the first `command failed` announcement, if any
pub fn parse_failure(log: &str) -> Option<String> {
    COMMAND_FAILED
        .captures(log)
        .and_then(|caps| caps.get(1))
        .map(|reason| reason.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_only() {
        let urls = parse_public_urls("URL:http://abc.ngrok.io Proto:http \n", Protocol::Http).unwrap();

        assert_eq!(urls.url, "http://abc.ngrok.io");
        assert_eq!(urls.url_https, None);
    }

    #[test]
    fn test_http_and_https() {
        let log = "t=2016 lvl=dbug msg=\"tunnel started\" URL:https://abc.ngrok.io Proto:https \n\
                   t=2016 lvl=dbug msg=\"tunnel started\" URL:http://abc.ngrok.io Proto:http \n";
        let urls = parse_public_urls(log, Protocol::Http).unwrap();

        assert_eq!(urls.url, "http://abc.ngrok.io");
        assert_eq!(urls.url_https.as_deref(), Some("https://abc.ngrok.io"));
    }

    #[test]
    fn test_https_alone_is_not_enough() {
        let log = "URL:https://abc.ngrok.io Proto:https \n";
        assert_eq!(parse_public_urls(log, Protocol::Http), None);
    }

    #[test]
    fn test_tcp_sets_both_slots() {
        let log = "lvl=info URL:tcp://0.tcp.ngrok.io:12345 Proto:tcp \n";
        let urls = parse_public_urls(log, Protocol::Tcp).unwrap();

        assert_eq!(urls.url, "tcp://0.tcp.ngrok.io:12345");
        assert_eq!(urls.url_https.as_deref(), Some("tcp://0.tcp.ngrok.io:12345"));
    }

    #[test]
    fn test_tls_only_matches_tls() {
        let log = "URL:http://abc.ngrok.io Proto:http \nURL:tls://abc.ngrok.io Proto:tls \n";
        let urls = parse_public_urls(log, Protocol::Tls).unwrap();
        assert_eq!(urls.url, "tls://abc.ngrok.io");

        assert_eq!(parse_public_urls(log, Protocol::Tcp), None);
    }

    #[test]
    fn test_most_recent_announcement_wins() {
        let log = "URL:http://old.ngrok.io Proto:http \nURL:http://new.ngrok.io Proto:http \n";
        let urls = parse_public_urls(log, Protocol::Http).unwrap();

        assert_eq!(urls.url, "http://new.ngrok.io");
    }

    #[test]
    fn test_requires_trailing_whitespace() {
        assert_eq!(parse_public_urls("URL:http://abc.ngrok.io Proto:http", Protocol::Http), None);
    }

    #[test]
    fn test_parse_failure() {
        let log = "t=2016 lvl=eror msg=\"command failed\" err=\"address already in use\"\n";
        assert_eq!(parse_failure(log).as_deref(), Some("address already in use"));
        assert_eq!(parse_failure("lvl=info msg=\"starting\"\n"), None);
    }
}
