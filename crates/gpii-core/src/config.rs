//! Component I: typed configuration, layered lowest-to-highest priority as
//! compiled-in defaults → optional file → environment → CLI flags. This
//! module only defines the shape; `gpii-bin` owns the layering itself so
//! that `clap`'s derive macros stay at the binary's edge.

use serde::{Deserialize, Serialize};

use crate::ledger::{MAX_FAILED_STARTS, MIN_HEALTHY_RUNTIME};

pub const DEFAULT_SERVICE_NAME: &str = "gpii-service";
pub const DEFAULT_PRODUCT_NAME: &str = "gpii";
pub const DEFAULT_PID_FILE_NAME: &str = "gpii.pid";

/// Overlay struct for an optional TOML config file: every field optional so
/// a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub service_name: Option<String>,
    pub product_name: Option<String>,
    pub log_level: Option<String>,
}

/// The fully-resolved configuration the supervisor runs with.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub service_name: String,
    pub product_name: String,
    pub log_level: String,
    pub min_healthy_runtime: std::time::Duration,
    pub max_failed_starts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            log_level: "info".to_string(),
            min_healthy_runtime: MIN_HEALTHY_RUNTIME,
            max_failed_starts: MAX_FAILED_STARTS,
        }
    }
}

impl SupervisorConfig {
    /// Apply a parsed config-file overlay on top of the defaults.
    pub fn apply_file(mut self, file: ConfigFile) -> Self {
        if let Some(name) = file.service_name {
            self.service_name = name;
        }
        if let Some(name) = file.product_name {
            self.product_name = name;
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overlay_only_touches_named_fields() {
        let base = SupervisorConfig::default();
        let overlay = ConfigFile {
            service_name: Some("custom-service".to_string()),
            ..Default::default()
        };
        let resolved = base.apply_file(overlay);
        assert_eq!(resolved.service_name, "custom-service");
        assert_eq!(resolved.product_name, DEFAULT_PRODUCT_NAME);
    }
}
