//! Kiosk configuration.
//!
//! Services, windows and the window-to-service routing are static: they are
//! loaded once at startup and never change while the process runs. The
//! configuration comes from a JSON file named by `KIOSK_CONFIG`, or from the
//! built-in default, with a few scalar overrides read from the environment.

use crate::types::{ServiceId, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming a JSON configuration file
pub const CONFIG_PATH_VAR: &str = "KIOSK_CONFIG";

/// Widest zero padding accepted; a `u32` sequence has at most 10 digits
pub const MAX_PADDING_WIDTH: usize = 10;

/// Longest call history accepted
pub const MAX_HISTORY_SIZE: usize = 100;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for [`KioskConfig`]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be parsed
    #[error("invalid value {value:?} for {var}")]
    InvalidOverride {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// Configuration is structurally inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A service customers can take a ticket for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unique service id
    pub id: ServiceId,
    /// Name shown to customers and staff
    pub name: String,
    /// Ticket prefix, uppercase ASCII letters (e.g. `C`)
    pub prefix: String,
}

/// A service window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Unique window id
    pub id: WindowId,
    /// Name shown on the display board
    pub name: String,
    /// Name used in voice announcements, defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken_name: Option<String>,
}

impl WindowConfig {
    /// Name to use in announcements
    #[must_use]
    pub fn announced_name(&self) -> &str {
        self.spoken_name.as_deref().unwrap_or(&self.name)
    }
}

/// Complete kiosk configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KioskConfig {
    /// Configured services, in display order
    pub services: Vec<ServiceConfig>,
    /// Configured windows, in display order
    pub windows: Vec<WindowConfig>,
    /// Services each window may call, in no particular priority
    pub routing: BTreeMap<WindowId, Vec<ServiceId>>,
    /// Minimum digits in a display code
    #[serde(default = "default_padding_width")]
    pub padding_width: usize,
    /// Entries kept in the call-history ring
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Average minutes per customer, used for wait estimates
    #[serde(default = "default_average_service_minutes")]
    pub average_service_minutes: u32,
    /// Print a receipt automatically when a ticket is issued
    #[serde(default = "default_print_on_issue")]
    pub print_on_issue: bool,
    /// Heading printed on receipts
    #[serde(default = "default_clinic_name")]
    pub clinic_name: String,
    /// Announcement text with `{code}` and `{window}` placeholders
    #[serde(default = "default_announcement_template")]
    pub announcement_template: String,
}

const fn default_padding_width() -> usize {
    3
}

const fn default_history_size() -> usize {
    5
}

const fn default_average_service_minutes() -> u32 {
    15
}

const fn default_print_on_issue() -> bool {
    true
}

fn default_clinic_name() -> String {
    "Clínica Torcoroma".to_string()
}

fn default_announcement_template() -> String {
    "Turno {code}, favor dirigirse a {window}".to_string()
}

impl Default for KioskConfig {
    fn default() -> Self {
        let service = |id: &str, name: &str, prefix: &str| ServiceConfig {
            id: ServiceId::from(id),
            name: name.to_string(),
            prefix: prefix.to_string(),
        };
        let window = |id: &str, number: u8| WindowConfig {
            id: WindowId::from(id),
            name: format!("Ventanilla {number}"),
            spoken_name: Some(format!("ventanilla número {number}")),
        };

        Self {
            services: vec![
                service("general", "Citas Médicas", "C"),
                service("specialist", "Facturación", "F"),
                service("preferential", "Preferencial", "P"),
            ],
            windows: vec![window("w1", 1), window("w2", 2)],
            routing: BTreeMap::from([
                (WindowId::from("w1"), vec![ServiceId::from("general")]),
                (
                    WindowId::from("w2"),
                    vec![ServiceId::from("specialist"), ServiceId::from("preferential")],
                ),
            ]),
            padding_width: default_padding_width(),
            history_size: default_history_size(),
            average_service_minutes: default_average_service_minutes(),
            print_on_issue: default_print_on_issue(),
            clinic_name: default_clinic_name(),
            announcement_template: default_announcement_template(),
        }
    }
}

impl KioskConfig {
    /// Load configuration from the environment.
    ///
    /// Reads the JSON file named by `KIOSK_CONFIG` when set, otherwise starts
    /// from [`KioskConfig::default`]. Then applies `KIOSK_PADDING_WIDTH`,
    /// `KIOSK_HISTORY_SIZE`, `KIOSK_AVG_SERVICE_MINUTES` and
    /// `KIOSK_PRINT_ON_ISSUE` overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// override is malformed, or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Some(width) = parse_override("KIOSK_PADDING_WIDTH")? {
            config.padding_width = width;
        }
        if let Some(size) = parse_override("KIOSK_HISTORY_SIZE")? {
            config.history_size = size;
        }
        if let Some(minutes) = parse_override("KIOSK_AVG_SERVICE_MINUTES")? {
            config.average_service_minutes = minutes;
        }
        if let Some(print) = parse_override("KIOSK_PRINT_ON_ISSUE")? {
            config.print_on_issue = print;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.services.is_empty() {
            return invalid("at least one service is required".to_string());
        }
        if self.windows.is_empty() {
            return invalid("at least one window is required".to_string());
        }
        if !(1..=MAX_PADDING_WIDTH).contains(&self.padding_width) {
            return invalid(format!("padding_width must be between 1 and {MAX_PADDING_WIDTH}"));
        }
        if !(1..=MAX_HISTORY_SIZE).contains(&self.history_size) {
            return invalid(format!("history_size must be between 1 and {MAX_HISTORY_SIZE}"));
        }

        let mut ids = HashSet::new();
        let mut prefixes = HashSet::new();
        for service in &self.services {
            if service.id.as_str().trim().is_empty() {
                return invalid("service id cannot be empty".to_string());
            }
            if service.name.trim().is_empty() {
                return invalid(format!("service {} has an empty name", service.id));
            }
            if service.prefix.is_empty() || !service.prefix.bytes().all(|b| b.is_ascii_uppercase()) {
                return invalid(format!(
                    "service {} prefix {:?} must be uppercase ASCII letters",
                    service.id, service.prefix
                ));
            }
            if !ids.insert(&service.id) {
                return invalid(format!("duplicate service id {}", service.id));
            }
            if !prefixes.insert(&service.prefix) {
                return invalid(format!("duplicate prefix {}", service.prefix));
            }
        }

        let mut window_ids = HashSet::new();
        for window in &self.windows {
            if window.id.as_str().trim().is_empty() {
                return invalid("window id cannot be empty".to_string());
            }
            if window.name.trim().is_empty() {
                return invalid(format!("window {} has an empty name", window.id));
            }
            if !window_ids.insert(&window.id) {
                return invalid(format!("duplicate window id {}", window.id));
            }
        }

        for (window_id, services) in &self.routing {
            if !window_ids.contains(window_id) {
                return invalid(format!("routing names unknown window {window_id}"));
            }
            if let Some(unknown) = services.iter().find(|s| !ids.contains(s)) {
                return invalid(format!(
                    "routing for {window_id} names unknown service {unknown}"
                ));
            }
        }

        Ok(())
    }

    /// Looks up a service by id
    #[must_use]
    pub fn service(&self, id: &ServiceId) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| &s.id == id)
    }

    /// Looks up a service by ticket prefix
    #[must_use]
    pub fn service_by_prefix(&self, prefix: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.prefix == prefix)
    }

    /// Looks up a window by id
    #[must_use]
    pub fn window(&self, id: &WindowId) -> Option<&WindowConfig> {
        self.windows.iter().find(|w| &w.id == id)
    }

    /// Services a window may call. Windows without a routing entry serve nothing.
    #[must_use]
    pub fn allowed_services(&self, window_id: &WindowId) -> &[ServiceId] {
        self.routing
            .get(window_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Windows that may call a service
    #[must_use]
    pub fn eligible_windows(&self, service_id: &ServiceId) -> Vec<&WindowId> {
        self.windows
            .iter()
            .map(|w| &w.id)
            .filter(|id| self.allowed_services(id).contains(service_id))
            .collect()
    }

    /// Renders the announcement text for a code and window name
    #[must_use]
    pub fn announcement_text(&self, code: &str, window_name: &str) -> String {
        self.announcement_template
            .replace("{code}", code)
            .replace("{window}", window_name)
    }
}

fn parse_override<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    fn assert_invalid(config: &KioskConfig, fragment: &str) {
        match config.validate() {
            Err(ConfigError::Invalid(msg)) => {
                assert!(msg.contains(fragment), "{msg:?} should mention {fragment:?}");
            },
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_default_is_valid() {
        let config = KioskConfig::default();
        config.validate().unwrap();
        assert_eq!(config.padding_width, 3);
        assert_eq!(config.history_size, 5);
        assert_eq!(config.average_service_minutes, 15);
    }

    #[test]
    fn test_default_routing() {
        let config = KioskConfig::default();
        assert_eq!(
            config.allowed_services(&WindowId::from("w1")),
            &[ServiceId::from("general")]
        );
        assert_eq!(
            config.eligible_windows(&ServiceId::from("preferential")),
            vec![&WindowId::from("w2")]
        );
        assert!(config.allowed_services(&WindowId::from("w9")).is_empty());
    }

    #[test]
    fn test_rejects_duplicate_prefix() {
        let mut config = KioskConfig::default();
        config.services[1].prefix = "C".to_string();
        assert_invalid(&config, "duplicate prefix");
    }

    #[test]
    fn test_rejects_lowercase_prefix() {
        let mut config = KioskConfig::default();
        config.services[0].prefix = "c".to_string();
        assert_invalid(&config, "uppercase");
    }

    #[test]
    fn test_rejects_routing_to_unknown_service() {
        let mut config = KioskConfig::default();
        config
            .routing
            .insert(WindowId::from("w1"), vec![ServiceId::from("dentistry")]);
        assert_invalid(&config, "unknown service dentistry");
    }

    #[test]
    fn test_rejects_routing_from_unknown_window() {
        let mut config = KioskConfig::default();
        config
            .routing
            .insert(WindowId::from("w3"), vec![ServiceId::from("general")]);
        assert_invalid(&config, "unknown window w3");
    }

    #[test]
    fn test_rejects_zero_history() {
        let config = KioskConfig {
            history_size: 0,
            ..KioskConfig::default()
        };
        assert_invalid(&config, "history_size");
    }

    #[test]
    fn test_rejects_huge_padding() {
        let config = KioskConfig {
            padding_width: 70_000,
            ..KioskConfig::default()
        };
        assert_invalid(&config, "padding_width");

        let widest = KioskConfig {
            padding_width: MAX_PADDING_WIDTH,
            ..KioskConfig::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn test_rejects_huge_history() {
        let config = KioskConfig {
            history_size: usize::MAX,
            ..KioskConfig::default()
        };
        assert_invalid(&config, "history_size");

        let longest = KioskConfig {
            history_size: MAX_HISTORY_SIZE,
            ..KioskConfig::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_json_defaults_apply() {
        let json = r#"{
            "services": [{ "id": "lab", "name": "Laboratorio", "prefix": "L" }],
            "windows": [{ "id": "w1", "name": "Ventanilla 1" }],
            "routing": { "w1": ["lab"] }
        }"#;
        let config: KioskConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.padding_width, 3);
        assert!(config.print_on_issue);
        assert_eq!(config.windows[0].announced_name(), "Ventanilla 1");
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = KioskConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_announcement_text() {
        let config = KioskConfig::default();
        assert_eq!(
            config.announcement_text("C001", "ventanilla número 1"),
            "Turno C001, favor dirigirse a ventanilla número 1"
        );
    }
}
