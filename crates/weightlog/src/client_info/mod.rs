//! Metadata about the client making a request.
//!
//! The `/user_info` page reports the caller's address, an approximate
//! location, and what the user agent string says about the browser, OS and
//! device. Every lookup is also appended to a plain-text client log.

mod geo;

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;

use axum::http::HeaderMap;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, warn};

pub use geo::{
    from_config as geolocator_from_config, DisabledGeolocator, Geolocator, IpApiGeolocator,
};

use crate::error::{Error, Result};
use crate::measurement::format_timestamp;
use crate::storage::ensure_parent_dir;

/// Placeholder used for anything the user agent parser cannot identify.
pub const UNKNOWN: &str = "Other";

/// Placeholder used when no client address is available.
pub const UNKNOWN_IP: &str = "unknown";

/// Browser, OS and device details parsed from a `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    /// Browser family, e.g. `Chrome`.
    pub browser: String,
    /// Browser version string.
    pub browser_version: String,
    /// Operating system family.
    pub os: String,
    /// Operating system version string.
    pub os_version: String,
    /// Device category, e.g. `pc` or `smartphone`.
    pub device: String,
    /// Device or browser vendor.
    pub vendor: String,
}

impl AgentInfo {
    /// Parse a user agent string. Missing or unrecognized agents report [`UNKNOWN`].
    #[must_use]
    pub fn parse(user_agent: Option<&str>) -> Self {
        let parsed = user_agent
            .filter(|ua| !ua.trim().is_empty())
            .and_then(|ua| woothee::parser::Parser::new().parse(ua));

        match parsed {
            Some(result) => Self {
                browser: known(result.name),
                browser_version: known(result.version),
                os: known(result.os),
                os_version: known(&result.os_version),
                device: known(result.category),
                vendor: known(result.vendor),
            },
            None => Self::unknown(),
        }
    }

    fn unknown() -> Self {
        Self {
            browser: UNKNOWN.to_string(),
            browser_version: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            os_version: UNKNOWN.to_string(),
            device: UNKNOWN.to_string(),
            vendor: UNKNOWN.to_string(),
        }
    }
}

fn known(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("UNKNOWN") {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

/// Result of a location lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Location {
    /// `city, region, country`.
    Known(String),
    /// The lookup failed for the given reason.
    Unknown(String),
}

impl Location {
    /// Build a location from a lookup result.
    #[must_use]
    pub fn from_lookup(result: Result<String>) -> Self {
        match result {
            Ok(location) => Self::Known(location),
            Err(Error::Lookup(reason)) => Self::Unknown(reason),
            Err(e) => Self::Unknown(e.to_string()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(location) => write!(f, "{location}"),
            Self::Unknown(reason) => write!(f, "Could not determine location: {reason}"),
        }
    }
}

/// Everything shown on the client info page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientReport {
    /// Client address.
    pub ip: String,
    /// Approximate location.
    pub location: Location,
    /// Parsed user agent.
    pub agent: AgentInfo,
    /// When the request was handled.
    pub seen_at: NaiveDateTime,
}

impl ClientReport {
    /// Gather the report for one request.
    pub async fn gather(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        geolocator: &dyn Geolocator,
    ) -> Self {
        let ip = client_ip(headers, peer);
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        let agent = AgentInfo::parse(user_agent);

        let location = if ip == UNKNOWN_IP {
            Location::Unknown("no client address".to_string())
        } else {
            let result = geolocator.locate(&ip).await;
            if let Err(e) = &result {
                warn!(ip = %ip, "location lookup failed: {e}");
            }
            Location::from_lookup(result)
        };

        Self {
            ip,
            location,
            agent,
            seen_at: crate::measurement::now(),
        }
    }

    /// One line of the client log:
    /// `ip,location,browser version,os version,device vendor,timestamp`.
    #[must_use]
    pub fn log_line(&self) -> String {
        let a = &self.agent;
        format!(
            "{},{},{} {},{} {},{} {},{}",
            self.ip,
            self.location,
            a.browser,
            a.browser_version,
            a.os,
            a.os_version,
            a.device,
            a.vendor,
            format_timestamp(&self.seen_at),
        )
    }

    /// Append this report to the client log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or written.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", self.log_line())?;
        debug!("appended client record to {}", path.display());
        Ok(())
    }
}

/// Client address: the first `X-Forwarded-For` entry, else the socket peer,
/// else [`UNKNOWN_IP`].
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(ToString::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

    #[derive(Debug)]
    struct FixedGeolocator(Option<&'static str>);

    #[async_trait::async_trait]
    impl Geolocator for FixedGeolocator {
        async fn locate(&self, _ip: &str) -> Result<String> {
            self.0
                .map(ToString::to_string)
                .ok_or_else(|| Error::lookup("connection refused"))
        }
    }

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:51234".parse().unwrap())
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "10.0.0.7");
    }

    #[test]
    fn test_client_ip_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        assert_eq!(client_ip(&headers, None), UNKNOWN_IP);
    }

    #[test]
    fn test_agent_info_parse_firefox() {
        let agent = AgentInfo::parse(Some(FIREFOX_LINUX));
        assert_eq!(agent.browser, "Firefox");
        assert_eq!(agent.browser_version, "121.0");
        assert_eq!(agent.os, "Linux");
        assert_eq!(agent.device, "pc");
    }

    #[test]
    fn test_agent_info_unknown() {
        assert_eq!(AgentInfo::parse(None), AgentInfo::unknown());
        assert_eq!(AgentInfo::parse(Some("")), AgentInfo::unknown());

        let agent = AgentInfo::parse(Some("definitely-not-a-browser"));
        assert_eq!(agent.browser, UNKNOWN);
    }

    #[test]
    fn test_location_display() {
        let known = Location::Known("Paris, Ile-de-France, France".to_string());
        assert_eq!(known.to_string(), "Paris, Ile-de-France, France");

        let unknown = Location::from_lookup(Err(Error::lookup("timed out")));
        assert_eq!(
            unknown.to_string(),
            "Could not determine location: timed out"
        );
    }

    #[tokio::test]
    async fn test_gather_with_location() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static(FIREFOX_LINUX),
        );
        let geo = FixedGeolocator(Some("Oslo, Oslo County, Norway"));

        let report = ClientReport::gather(&headers, peer(), &geo).await;
        assert_eq!(report.ip, "10.0.0.7");
        assert_eq!(
            report.location,
            Location::Known("Oslo, Oslo County, Norway".to_string())
        );
        assert_eq!(report.agent.browser, "Firefox");
    }

    #[tokio::test]
    async fn test_gather_lookup_failure_still_reports() {
        let report = ClientReport::gather(&HeaderMap::new(), peer(), &FixedGeolocator(None)).await;
        assert_eq!(
            report.location.to_string(),
            "Could not determine location: connection refused"
        );
        assert_eq!(report.agent, AgentInfo::unknown());
    }

    #[tokio::test]
    async fn test_gather_without_address_skips_lookup() {
        let geo = FixedGeolocator(Some("should not be used"));
        let report = ClientReport::gather(&HeaderMap::new(), None, &geo).await;
        assert_eq!(report.ip, UNKNOWN_IP);
        assert!(matches!(report.location, Location::Unknown(_)));
    }

    #[tokio::test]
    async fn test_append_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/user_info.log");
        let geo = FixedGeolocator(Some("Oslo"));
        let report = ClientReport::gather(&HeaderMap::new(), peer(), &geo).await;

        report.append_to(&path).unwrap();
        report.append_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("10.0.0.7,Oslo,Other Other,Other Other,Other Other,"));
        assert!(lines[0].ends_with(&format_timestamp(&report.seen_at)));
    }
}
