//! IP geolocation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

/// Resolves a client address to a human-readable location.
#[async_trait]
pub trait Geolocator: Send + Sync + std::fmt::Debug {
    /// Look up `ip`, returning `"city, region, country"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lookup`] if the location cannot be determined.
    async fn locate(&self, ip: &str) -> Result<String>;
}

/// Build the geolocator selected by `client_info.geolocation_enabled`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn from_config(config: &Config) -> Result<std::sync::Arc<dyn Geolocator>> {
    if config.client_info.geolocation_enabled {
        Ok(std::sync::Arc::new(IpApiGeolocator::new(
            &config.client_info.lookup_url,
            config.lookup_timeout(),
        )?))
    } else {
        Ok(std::sync::Arc::new(DisabledGeolocator))
    }
}

/// Looks addresses up with an ip-api.com style JSON endpoint.
#[derive(Debug, Clone)]
pub struct IpApiGeolocator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    status: Option<String>,
    message: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    country: Option<String>,
}

impl IpApiGeolocator {
    /// Create a geolocator that requests `{base_url}{ip}` with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::lookup(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Geolocator for IpApiGeolocator {
    async fn locate(&self, ip: &str) -> Result<String> {
        let url = format!("{}{ip}", self.base_url);
        debug!("looking up location at {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::lookup(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::lookup(e.to_string()))?;

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::lookup(e.to_string()))?;
        format_location(body)
    }
}

fn format_location(body: LookupResponse) -> Result<String> {
    if body.status.as_deref() == Some("fail") {
        let reason = body.message.unwrap_or_else(|| "lookup failed".to_string());
        return Err(Error::lookup(reason));
    }

    match (body.city, body.region_name, body.country) {
        (Some(city), Some(region), Some(country)) => Ok(format!("{city}, {region}, {country}")),
        (None, _, _) => Err(Error::lookup("missing field 'city'")),
        (_, None, _) => Err(Error::lookup("missing field 'regionName'")),
        (_, _, None) => Err(Error::lookup("missing field 'country'")),
    }
}

/// Never looks anything up.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeolocator;

#[async_trait]
impl Geolocator for DisabledGeolocator {
    async fn locate(&self, _ip: &str) -> Result<String> {
        Err(Error::lookup("geolocation is disabled"))
    }
}
