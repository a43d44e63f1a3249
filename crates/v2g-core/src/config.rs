//! SECC session configuration.
//!
//! [`SessionConfig`] is the TOML-facing shape: names are plain strings so a
//! hand-edited file with odd casing or stray entries still loads.
//! [`SessionConfig::resolve`] turns it into [`SeccSettings`], the typed form
//! the state machine works with.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::context::EvseDataContext;
use crate::protocol::constants::{
    DEFAULT_MAX_SUPPORTING_POINTS, SECC_ONGOING_TIMEOUT_SECS, SECC_SEQUENCE_TIMEOUT_SECS,
};
use crate::protocol::types::{AuthMode, ControlMode, Protocol, ServiceV20};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("None of the configured protocols is supported")]
    NoSupportedProtocols,

    #[error("None of the configured energy services is supported")]
    NoSupportedEnergyServices,

    #[error("None of the configured authorization modes is supported")]
    NoSupportedAuthModes,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration for an SECC session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// EVSEID announced in SessionSetupRes.
    pub evse_id: String,
    /// Protocol names, e.g. `ISO_15118_2`, `ISO_15118_20_AC`.
    pub protocols: Vec<String>,
    /// -20 service names, e.g. `AC`, `DC_BPT`, `INTERNET`.
    pub energy_services: Vec<String>,
    /// `EIM` and/or `PNC`.
    pub auth_modes: Vec<String>,
    pub control_modes: Vec<ControlMode>,
    /// Whether charging services are announced as free.
    pub free_charging_service: bool,
    pub sequence_timeout_secs: u64,
    pub ongoing_timeout_secs: u64,
    pub max_supporting_points: u16,
    /// Departure time the simulated EV announces, in seconds.
    pub ev_departure_time: Option<u32>,
    /// Capability overrides for the simulated charger.
    pub evse: EvseDataContext,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            evse_id: "DE*V2G*E0001".to_string(),
            protocols: vec![
                Protocol::Iso15118_2.name().to_string(),
                Protocol::Iso15118_20Ac.name().to_string(),
                Protocol::Iso15118_20Dc.name().to_string(),
            ],
            energy_services: ["AC", "DC", "AC_BPT", "DC_BPT"]
                .into_iter()
                .map(String::from)
                .collect(),
            auth_modes: vec!["EIM".to_string(), "PNC".to_string()],
            control_modes: vec![ControlMode::Scheduled, ControlMode::Dynamic],
            free_charging_service: false,
            sequence_timeout_secs: SECC_SEQUENCE_TIMEOUT_SECS,
            ongoing_timeout_secs: SECC_ONGOING_TIMEOUT_SECS,
            max_supporting_points: DEFAULT_MAX_SUPPORTING_POINTS,
            ev_departure_time: None,
            evse: EvseDataContext::default(),
        }
    }
}

/// Trim, upper-case and de-duplicate, keeping the first occurrence.
fn normalize(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| name.trim().to_ascii_uppercase())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

/// Map names through `lookup`, warning about and skipping unknown ones.
fn resolve_names<T>(
    field: &'static str,
    names: &[String],
    lookup: impl Fn(&str) -> Option<T>,
) -> Vec<T> {
    normalize(names)
        .iter()
        .filter_map(|name| {
            let resolved = lookup(name);
            if resolved.is_none() {
                warn!(field, name = %name, "Ignoring unsupported configuration entry");
            }
            resolved
        })
        .collect()
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn supported_protocols(&self) -> Result<Vec<Protocol>, ConfigError> {
        let protocols = resolve_names("protocols", &self.protocols, Protocol::from_name);
        if protocols.is_empty() {
            return Err(ConfigError::NoSupportedProtocols);
        }
        Ok(protocols)
    }

    pub fn supported_energy_services(&self) -> Result<Vec<ServiceV20>, ConfigError> {
        let services = resolve_names("energy_services", &self.energy_services, ServiceV20::from_name);
        if !services.iter().any(ServiceV20::is_energy_service) {
            return Err(ConfigError::NoSupportedEnergyServices);
        }
        Ok(services)
    }

    pub fn supported_auth_modes(&self) -> Result<Vec<AuthMode>, ConfigError> {
        let modes = resolve_names("auth_modes", &self.auth_modes, AuthMode::from_name);
        if modes.is_empty() {
            return Err(ConfigError::NoSupportedAuthModes);
        }
        Ok(modes)
    }

    /// Check every list and value and produce the typed settings.
    pub fn resolve(&self) -> Result<SeccSettings, ConfigError> {
        if self.sequence_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sequence_timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if self.ongoing_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ongoing_timeout_secs",
                reason: "must be positive".into(),
            });
        }
        if self.control_modes.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "control_modes",
                reason: "at least one control mode is required".into(),
            });
        }
        if self.max_supporting_points == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_supporting_points",
                reason: "must be positive".into(),
            });
        }
        let mut seen = HashSet::new();
        let control_modes: Vec<ControlMode> = self
            .control_modes
            .iter()
            .copied()
            .filter(|mode| seen.insert(*mode))
            .collect();

        Ok(SeccSettings {
            protocols: self.supported_protocols()?,
            energy_services: self.supported_energy_services()?,
            auth_modes: self.supported_auth_modes()?,
            control_modes,
            free_charging_service: self.free_charging_service,
            sequence_timeout: Duration::from_secs(self.sequence_timeout_secs),
            ongoing_timeout: Duration::from_secs(self.ongoing_timeout_secs),
            max_supporting_points: self.max_supporting_points,
        })
    }
}

/// Typed, validated settings the state machine runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct SeccSettings {
    pub protocols: Vec<Protocol>,
    /// -20 services, energy and value-added.
    pub energy_services: Vec<ServiceV20>,
    pub auth_modes: Vec<AuthMode>,
    pub control_modes: Vec<ControlMode>,
    pub free_charging_service: bool,
    pub sequence_timeout: Duration,
    pub ongoing_timeout: Duration,
    pub max_supporting_points: u16,
}

impl Default for SeccSettings {
    fn default() -> Self {
        Self {
            protocols: vec![
                Protocol::Iso15118_2,
                Protocol::Iso15118_20Ac,
                Protocol::Iso15118_20Dc,
            ],
            energy_services: vec![
                ServiceV20::Ac,
                ServiceV20::Dc,
                ServiceV20::AcBpt,
                ServiceV20::DcBpt,
            ],
            auth_modes: AuthMode::ALL.to_vec(),
            control_modes: vec![ControlMode::Scheduled, ControlMode::Dynamic],
            free_charging_service: false,
            sequence_timeout: Duration::from_secs(SECC_SEQUENCE_TIMEOUT_SECS),
            ongoing_timeout: Duration::from_secs(SECC_ONGOING_TIMEOUT_SECS),
            max_supporting_points: DEFAULT_MAX_SUPPORTING_POINTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_default_resolves_to_default_settings() {
        assert_eq!(SessionConfig::default().resolve().unwrap(), SeccSettings::default());
    }

    #[test]
    fn test_lists_are_normalized() {
        let config = SessionConfig {
            protocols: names(&[" iso_15118_2 ", "ISO_15118_2", "ISO_15118_20_DC", "FOO"]),
            auth_modes: names(&["eim", "Eim", "PNC"]),
            ..Default::default()
        };
        assert_eq!(
            config.supported_protocols().unwrap(),
            vec![Protocol::Iso15118_2, Protocol::Iso15118_20Dc]
        );
        assert_eq!(
            config.supported_auth_modes().unwrap(),
            vec![AuthMode::Eim, AuthMode::Pnc]
        );
    }

    #[test]
    fn test_empty_intersections_fail() {
        let config = SessionConfig {
            protocols: names(&["ISO_15118_1"]),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::NoSupportedProtocols)
        ));

        let config = SessionConfig {
            energy_services: names(&["INTERNET"]),
            ..Default::default()
        };
        assert!(matches!(
            config.supported_energy_services(),
            Err(ConfigError::NoSupportedEnergyServices)
        ));

        let config = SessionConfig {
            auth_modes: vec![],
            ..Default::default()
        };
        assert!(matches!(
            config.supported_auth_modes(),
            Err(ConfigError::NoSupportedAuthModes)
        ));
    }

    #[test]
    fn test_control_modes_deduplicated_in_order() {
        let config = SessionConfig {
            control_modes: vec![
                ControlMode::Dynamic,
                ControlMode::Scheduled,
                ControlMode::Dynamic,
            ],
            ..Default::default()
        };
        assert_eq!(
            config.resolve().unwrap().control_modes,
            vec![ControlMode::Dynamic, ControlMode::Scheduled]
        );
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = SessionConfig {
            sequence_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue {
                field: "sequence_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SessionConfig = toml::from_str(
            r#"
            evse_id = "DE*ABC*E42"
            energy_services = ["dc", "dc_bpt"]

            [evse]
            max_charge_power = 50000.0
            "#,
        )
        .unwrap();
        assert_eq!(config.evse_id, "DE*ABC*E42");
        assert_eq!(config.sequence_timeout_secs, 60);
        assert_eq!(config.evse.max_charge_power, Some(50000.0));
        assert_eq!(
            config.supported_energy_services().unwrap(),
            vec![ServiceV20::Dc, ServiceV20::DcBpt]
        );
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("v2g-config-{}.toml", std::process::id()));
        let config = SessionConfig {
            ev_departure_time: Some(3600),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
