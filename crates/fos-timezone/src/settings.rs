//! Spoofing settings
//!
//! The read-only view of user settings the core consumes. Written by the
//! settings layer, observed by the gate, the interstitial and the
//! detection trigger.

use crate::whitelist::{Pattern, SpoofConfig};
use serde::{Deserialize, Serialize};

/// Settings errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Timezone spoofing requires the proxy to be enabled")]
    ProxyDisabled,
}

/// User-facing switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Proxy routing on
    pub enabled: bool,
    /// Timezone spoofing on (only meaningful with the proxy on)
    pub timezone_enabled: bool,
    /// Hosts never spoofed
    pub whitelist: Vec<Pattern>,
}

impl Settings {
    /// Settings with proxy and spoofing on
    pub fn spoofing(whitelist: Vec<Pattern>) -> Self {
        Self {
            enabled: true,
            timezone_enabled: true,
            whitelist,
        }
    }

    /// Whether spoofing is effectively on
    pub fn spoofing_active(&self) -> bool {
        self.enabled && self.timezone_enabled
    }

    /// Enforce the proxy/spoofing dependency, turning spoofing off when
    /// the proxy is off.
    pub fn normalized(mut self) -> Self {
        if !self.enabled {
            self.timezone_enabled = false;
        }
        self
    }

    /// Strict check used when the user explicitly toggles spoofing on
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.timezone_enabled && !self.enabled {
            return Err(SettingsError::ProxyDisabled);
        }
        Ok(())
    }

    /// Gate configuration derived from these settings
    pub fn spoof_config(&self) -> SpoofConfig {
        SpoofConfig {
            enabled: self.spoofing_active(),
            whitelist: self.whitelist.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::parse_whitelist;

    #[test]
    fn test_default_is_off() {
        let settings = Settings::default();
        assert!(!settings.spoofing_active());
        assert!(!settings.spoof_config().enabled);
    }

    #[test]
    fn test_normalized_forces_timezone_off() {
        let settings = Settings {
            enabled: false,
            timezone_enabled: true,
            whitelist: Vec::new(),
        };
        assert_eq!(settings.validate(), Err(SettingsError::ProxyDisabled));

        let settings = settings.normalized();
        assert!(!settings.timezone_enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_spoof_config() {
        let settings = Settings::spoofing(parse_whitelist("example.com"));
        let config = settings.spoof_config();
        assert!(config.enabled);
        assert!(config.is_whitelisted("www.example.com"));
    }

    #[test]
    fn test_serde_camel_case() {
        let json = r#"{"enabled":true,"timezoneEnabled":true,"whitelist":["*.lan"]}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(settings.spoofing_active());
        assert!(settings.whitelist[0].is_glob());
    }
}
