// Per-tenant limits as they appear in configuration
//
// Selectors are kept as strings here; they are compiled into matchers
// when the limits are loaded into the runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Limits and per-tenant switches for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantLimitsConfig {
    pub retention_period_hours: u64,
    pub retention_stream: Vec<RetentionStreamRule>,
    /// Policy name -> streams assigned to it
    pub policy_stream_mapping: BTreeMap<String, Vec<PolicyStreamRule>>,
    /// Streams matching any of these selectors are filtered out at parse time.
    pub drop_streams: Vec<String>,
    pub log_push_request: bool,
    pub log_push_request_streams: bool,
    pub limited_log_push_errors: bool,
}

impl Default for TenantLimitsConfig {
    fn default() -> Self {
        Self {
            retention_period_hours: 744,
            retention_stream: Vec::new(),
            policy_stream_mapping: BTreeMap::new(),
            drop_streams: Vec::new(),
            log_push_request: false,
            log_push_request_streams: false,
            limited_log_push_errors: true,
        }
    }
}

impl TenantLimitsConfig {
    /// All selector strings carried by these limits
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.retention_stream
            .iter()
            .map(|r| r.selector.as_str())
            .chain(
                self.policy_stream_mapping
                    .values()
                    .flatten()
                    .map(|r| r.selector.as_str()),
            )
            .chain(self.drop_streams.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionStreamRule {
    pub selector: String,
    #[serde(default)]
    pub priority: u32,
    pub period_hours: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStreamRule {
    pub selector: String,
    #[serde(default)]
    pub priority: u32,
}

/// Contents of the reloadable overrides file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverridesFile {
    #[serde(default)]
    pub overrides: BTreeMap<String, TenantLimitsConfig>,
}

/// Read and parse an overrides file
pub fn load_overrides_file(path: impl AsRef<Path>) -> Result<OverridesFile> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse overrides file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides_file() {
        let file: OverridesFile = toml::from_str(
            r#"
            [overrides.tenant-a]
            retention_period_hours = 24
            drop_streams = ['{env="dev"}']

            [[overrides.tenant-a.retention_stream]]
            selector = '{app="audit"}'
            priority = 2
            period_hours = 8760

            [[overrides.tenant-a.policy_stream_mapping.finance]]
            selector = '{team="finance"}'
            priority = 1
            "#,
        )
        .unwrap();

        let tenant = &file.overrides["tenant-a"];
        assert_eq!(tenant.retention_period_hours, 24);
        assert_eq!(tenant.retention_stream[0].period_hours, 8760);
        assert_eq!(tenant.policy_stream_mapping["finance"][0].priority, 1);
        assert!(tenant.limited_log_push_errors);
        assert_eq!(tenant.selectors().count(), 3);
    }
}
