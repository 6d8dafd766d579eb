//! Facade configuration
//!
//! Loaded from JSON (camelCase keys) with an explicit environment switch for
//! raw-name testing mode.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Environment switch enabling raw class names as tokens.
pub const RAW_NAMES_ENV: &str = "FACADE_RAW_NAMES";

/// Default controller alias for components.
pub const DEFAULT_CONTROLLER_AS: &str = "$ctrl";

/// What to do with a bare class provider that was never marked injectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmarkedProviderPolicy {
    /// Fail module decoration.
    #[default]
    Reject,
    /// Register it anyway, without declared parameter types.
    Tolerate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacadeConfig {
    /// Use bare class names instead of `<Name>_<n>` synthetic tokens.
    pub raw_names: bool,
    pub unmarked_providers: UnmarkedProviderPolicy,
    pub controller_as: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            raw_names: false,
            unmarked_providers: UnmarkedProviderPolicy::default(),
            controller_as: DEFAULT_CONTROLLER_AS.to_string(),
        }
    }
}

impl FacadeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let config: FacadeConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = env::var(RAW_NAMES_ENV) {
            self.raw_names = matches!(value.trim(), "1" | "true");
        }
        self
    }

    pub fn with_raw_names(mut self, raw_names: bool) -> Self {
        self.raw_names = raw_names;
        self
    }

    pub fn with_unmarked_providers(mut self, policy: UnmarkedProviderPolicy) -> Self {
        self.unmarked_providers = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_synthetic_names_and_rejection() {
        let config = FacadeConfig::default();
        assert!(!config.raw_names);
        assert_eq!(config.unmarked_providers, UnmarkedProviderPolicy::Reject);
        assert_eq!(config.controller_as, "$ctrl");
    }

    #[test]
    fn should_parse_camel_case_json() {
        let config = FacadeConfig::from_json_str(
            r#"{ "rawNames": true, "unmarkedProviders": "tolerate", "controllerAs": "vm" }"#,
        )
        .unwrap();
        assert!(config.raw_names);
        assert_eq!(config.unmarked_providers, UnmarkedProviderPolicy::Tolerate);
        assert_eq!(config.controller_as, "vm");
    }

    #[test]
    fn should_fill_missing_keys_with_defaults() {
        let config = FacadeConfig::from_json_str(r#"{ "rawNames": true }"#).unwrap();
        assert!(config.raw_names);
        assert_eq!(config.controller_as, DEFAULT_CONTROLLER_AS);
    }

    #[test]
    fn should_reject_unknown_policy() {
        assert!(FacadeConfig::from_json_str(r#"{ "unmarkedProviders": "maybe" }"#).is_err());
    }
}
