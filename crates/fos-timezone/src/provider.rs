//! Timezone lookup providers
//!
//! Each provider is an independent IP-geolocation endpoint returning JSON
//! with an IANA zone somewhere in the body.

use crate::zone;
use fos_network::{Fetch, HttpError, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::trace;

/// Timeout for descriptors that do not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Why a single provider lookup failed
#[derive(Debug, thiserror::Error)]
pub enum ProviderFailure {
    #[error("timed out")]
    TimedOut,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(HttpError),

    #[error("malformed body: {0}")]
    Malformed(String),

    #[error("no timezone in response")]
    MissingZone,

    #[error("unknown timezone {0:?}")]
    InvalidZone(String),
}

impl From<HttpError> for ProviderFailure {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout => Self::TimedOut,
            other => Self::Transport(other),
        }
    }
}

/// Pulls the zone id out of a provider's JSON body
pub type ExtractZone = fn(&Value) -> Option<String>;

/// One lookup service
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Stable id, recorded as the result's source
    pub id: String,
    /// GET endpoint
    pub endpoint: String,
    /// Deadline for this provider alone
    pub timeout: Duration,
    /// Zone extraction
    pub extract: ExtractZone,
}

impl ProviderDescriptor {
    /// Descriptor with the default timeout
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, extract: ExtractZone) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            extract,
        }
    }

    /// Override the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Built-in providers, in preference order
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("ipwho.is", "https://ipwho.is/", |body| string_at(body, &["timezone", "id"]))
                .with_timeout(Duration::from_millis(3000)),
            Self::new("worldtimeapi", "https://worldtimeapi.org/api/ip", |body| {
                string_at(body, &["timezone"])
            })
            .with_timeout(Duration::from_millis(3000)),
            Self::new("ipapi.co", "https://ipapi.co/json/", |body| string_at(body, &["timezone"]))
                .with_timeout(Duration::from_millis(5000)),
        ]
    }

    /// Interpret a response body. Fails on malformed JSON, a missing zone
    /// or a zone the formatter would not accept.
    pub fn parse(&self, body: &[u8]) -> Result<String, ProviderFailure> {
        let json: Value =
            serde_json::from_slice(body).map_err(|e| ProviderFailure::Malformed(e.to_string()))?;

        let zone_id = (self.extract)(&json)
            .map(|z| z.trim().to_string())
            .filter(|z| !z.is_empty())
            .ok_or(ProviderFailure::MissingZone)?;

        if !zone::is_valid_zone(&zone_id) {
            return Err(ProviderFailure::InvalidZone(zone_id));
        }
        Ok(zone_id)
    }

    /// Query this provider once
    pub async fn lookup<F: Fetch>(&self, fetch: &F) -> Result<String, ProviderFailure> {
        let response = fetch.fetch(Method::GET, &self.endpoint).await?;
        if !response.is_success() {
            return Err(ProviderFailure::Status(response.status.as_u16()));
        }

        let zone_id = self.parse(&response.body)?;
        trace!("{} answered {}", self.id, zone_id);
        Ok(zone_id)
    }
}

/// String value at a nested object path
fn string_at(body: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(body, |node, key| node.get(key))?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str) -> ProviderDescriptor {
        ProviderDescriptor::defaults()
            .into_iter()
            .find(|p| p.id == id)
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let providers = ProviderDescriptor::defaults();
        let ids: Vec<_> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["ipwho.is", "worldtimeapi", "ipapi.co"]);
        assert_eq!(providers[0].timeout, Duration::from_secs(3));
        assert_eq!(providers[2].timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_default_timeout() {
        let p = ProviderDescriptor::new("x", "https://x/", |_| None);
        assert_eq!(p.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_extract_nested_zone() {
        let body = br#"{"ip":"1.2.3.4","timezone":{"id":"Europe/Berlin","utc":"+01:00"}}"#;
        assert_eq!(provider("ipwho.is").parse(body).unwrap(), "Europe/Berlin");
    }

    #[test]
    fn test_extract_flat_zone() {
        let body = br#"{"timezone":" America/Sao_Paulo "}"#;
        assert_eq!(provider("ipapi.co").parse(body).unwrap(), "America/Sao_Paulo");
    }

    #[test]
    fn test_parse_failures() {
        let p = provider("worldtimeapi");
        assert!(matches!(p.parse(b"<html>"), Err(ProviderFailure::Malformed(_))));
        assert!(matches!(p.parse(br#"{"timezone":""}"#), Err(ProviderFailure::MissingZone)));
        assert!(matches!(p.parse(br#"{"timezone":42}"#), Err(ProviderFailure::MissingZone)));
        assert!(matches!(
            p.parse(br#"{"timezone":"Mars/Olympus"}"#),
            Err(ProviderFailure::InvalidZone(_))
        ));
    }

    #[test]
    fn test_timeout_maps_to_timed_out() {
        assert!(matches!(ProviderFailure::from(HttpError::Timeout), ProviderFailure::TimedOut));
        assert!(matches!(
            ProviderFailure::from(HttpError::ConnectionFailed("refused".into())),
            ProviderFailure::Transport(_)
        ));
    }
}
