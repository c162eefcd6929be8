// Tenant limits and per-tenant switches
//
// RuntimeLimits compiles the configured defaults and overrides into
// immutable snapshots. Readers clone the current Arc; reload swaps it.

use logpush_config::{load_overrides_file, LimitsConfig, TenantLimitsConfig};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::labels::{Labels, LabelsError, Selector};
use crate::tenant::TenantId;

#[derive(Debug, Error)]
pub enum LimitsError {
    #[error("invalid selector '{selector}' in limits for {scope}: {source}")]
    InvalidSelector {
        scope: String,
        selector: String,
        #[source]
        source: LabelsError,
    },
    #[error("limits unavailable for tenant {tenant}: {message}")]
    Unavailable { tenant: String, message: String },
}

#[derive(Debug, Clone)]
struct RetentionRule {
    selector: Selector,
    priority: u32,
    period_hours: u64,
}

#[derive(Debug, Clone)]
struct PolicyRule {
    policy: String,
    selector: Selector,
    priority: u32,
}

/// Compiled limits for a single tenant
#[derive(Debug, Clone)]
pub struct TenantLimits {
    pub retention_period_hours: u64,
    retention_stream: Vec<RetentionRule>,
    policy_rules: Vec<PolicyRule>,
    drop_streams: Vec<Selector>,
    pub log_push_request: bool,
    pub log_push_request_streams: bool,
    pub limited_log_push_errors: bool,
}

impl TenantLimits {
    pub fn compile(scope: &str, config: &TenantLimitsConfig) -> Result<Self, LimitsError> {
        let parse = |selector: &str| {
            selector
                .parse::<Selector>()
                .map_err(|source| LimitsError::InvalidSelector {
                    scope: scope.to_string(),
                    selector: selector.to_string(),
                    source,
                })
        };

        let mut retention_stream = config
            .retention_stream
            .iter()
            .map(|rule| {
                Ok(RetentionRule {
                    selector: parse(&rule.selector)?,
                    priority: rule.priority,
                    period_hours: rule.period_hours,
                })
            })
            .collect::<Result<Vec<_>, LimitsError>>()?;
        // Highest priority first; equal priorities keep configuration order.
        retention_stream.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut policy_rules = Vec::new();
        for (policy, rules) in &config.policy_stream_mapping {
            for rule in rules {
                policy_rules.push(PolicyRule {
                    policy: policy.clone(),
                    selector: parse(&rule.selector)?,
                    priority: rule.priority,
                });
            }
        }
        policy_rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.policy.cmp(&b.policy))
        });

        let drop_streams = config
            .drop_streams
            .iter()
            .map(|s| parse(s))
            .collect::<Result<Vec<_>, LimitsError>>()?;

        Ok(Self {
            retention_period_hours: config.retention_period_hours,
            retention_stream,
            policy_rules,
            drop_streams,
            log_push_request: config.log_push_request,
            log_push_request_streams: config.log_push_request_streams,
            limited_log_push_errors: config.limited_log_push_errors,
        })
    }

    /// Retention for a stream: the highest-priority matching stream rule,
    /// else the tenant-wide period.
    pub fn retention_hours(&self, labels: &Labels) -> u64 {
        self.retention_stream
            .iter()
            .find(|rule| rule.selector.matches(labels))
            .map(|rule| rule.period_hours)
            .unwrap_or(self.retention_period_hours)
    }

    /// Policy for a stream; ties on priority go to the lexicographically
    /// smallest policy name.
    pub fn policy(&self, labels: &Labels) -> Option<&str> {
        self.policy_rules
            .iter()
            .find(|rule| rule.selector.matches(labels))
            .map(|rule| rule.policy.as_str())
    }

    pub fn is_dropped(&self, labels: &Labels) -> bool {
        self.drop_streams.iter().any(|s| s.matches(labels))
    }
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self {
            retention_period_hours: TenantLimitsConfig::default().retention_period_hours,
            retention_stream: Vec::new(),
            policy_rules: Vec::new(),
            drop_streams: Vec::new(),
            log_push_request: false,
            log_push_request_streams: false,
            limited_log_push_errors: true,
        }
    }
}

/// Access to tenant limits.
///
/// Implementations must tolerate concurrent reads while being refreshed.
pub trait Limits: Send + Sync {
    fn tenant_limits(&self, tenant: &TenantId) -> Result<Arc<TenantLimits>, LimitsError>;
}

/// Per-tenant logging switches consulted by the push handler
pub trait TenantConfigs: Send + Sync {
    fn log_push_request(&self, tenant: &TenantId) -> bool;
    fn log_push_request_streams(&self, tenant: &TenantId) -> bool;
    fn limited_log_push_errors(&self, tenant: &TenantId) -> bool;
}

#[derive(Debug, Default)]
struct LimitsSnapshot {
    defaults: Arc<TenantLimits>,
    overrides: HashMap<String, Arc<TenantLimits>>,
}

impl LimitsSnapshot {
    fn get(&self, tenant: &str) -> Arc<TenantLimits> {
        self.overrides
            .get(tenant)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.defaults))
    }
}

/// Configuration-backed limits with reloadable per-tenant overrides
#[derive(Debug)]
pub struct RuntimeLimits {
    defaults: TenantLimitsConfig,
    inline_overrides: BTreeMap<String, TenantLimitsConfig>,
    overrides_path: Option<PathBuf>,
    snapshot: RwLock<Arc<LimitsSnapshot>>,
}

impl RuntimeLimits {
    /// Build limits from configuration, reading the overrides file if one is set.
    pub fn from_config(config: &LimitsConfig) -> anyhow::Result<Self> {
        let limits = Self {
            defaults: config.defaults.clone(),
            inline_overrides: config.overrides.clone(),
            overrides_path: config.overrides_path.as_ref().map(PathBuf::from),
            snapshot: RwLock::new(Arc::default()),
        };
        limits.reload()?;
        Ok(limits)
    }

    pub fn overrides_path(&self) -> Option<&PathBuf> {
        self.overrides_path.as_ref()
    }

    /// Rebuild the snapshot from configuration and the overrides file.
    /// Entries in the file take precedence over inline overrides.
    /// On error the previous snapshot stays in place.
    pub fn reload(&self) -> anyhow::Result<()> {
        let mut overrides = self.inline_overrides.clone();
        if let Some(path) = &self.overrides_path {
            overrides.extend(load_overrides_file(path)?.overrides);
        }

        let snapshot = compile_snapshot(&self.defaults, &overrides)?;
        let tenants = snapshot.overrides.len();
        *self.snapshot.write() = Arc::new(snapshot);
        info!(tenants, "Loaded tenant limit overrides");
        Ok(())
    }

    fn current(&self) -> Arc<LimitsSnapshot> {
        self.snapshot.read().clone()
    }
}

fn compile_snapshot(
    defaults: &TenantLimitsConfig,
    overrides: &BTreeMap<String, TenantLimitsConfig>,
) -> Result<LimitsSnapshot, LimitsError> {
    let defaults = Arc::new(TenantLimits::compile("defaults", defaults)?);
    let overrides = overrides
        .iter()
        .map(|(tenant, config)| {
            let limits = TenantLimits::compile(&format!("tenant {}", tenant), config)?;
            Ok((tenant.clone(), Arc::new(limits)))
        })
        .collect::<Result<HashMap<_, _>, LimitsError>>()?;
    Ok(LimitsSnapshot {
        defaults,
        overrides,
    })
}

impl Limits for RuntimeLimits {
    fn tenant_limits(&self, tenant: &TenantId) -> Result<Arc<TenantLimits>, LimitsError> {
        Ok(self.current().get(tenant.as_str()))
    }
}

impl TenantConfigs for RuntimeLimits {
    fn log_push_request(&self, tenant: &TenantId) -> bool {
        self.current().get(tenant.as_str()).log_push_request
    }

    fn log_push_request_streams(&self, tenant: &TenantId) -> bool {
        self.current().get(tenant.as_str()).log_push_request_streams
    }

    fn limited_log_push_errors(&self, tenant: &TenantId) -> bool {
        self.current().get(tenant.as_str()).limited_log_push_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpush_config::{PolicyStreamRule, RetentionStreamRule};
    use std::io::Write;

    fn labels(s: &str) -> Labels {
        s.parse().unwrap()
    }

    fn tenant(s: &str) -> TenantId {
        TenantId::new(s).unwrap()
    }

    #[test]
    fn test_retention_highest_priority_wins() {
        let config = TenantLimitsConfig {
            retention_period_hours: 24,
            retention_stream: vec![
                RetentionStreamRule {
                    selector: r#"{app="api"}"#.to_string(),
                    priority: 1,
                    period_hours: 48,
                },
                RetentionStreamRule {
                    selector: r#"{app="api", env="prod"}"#.to_string(),
                    priority: 5,
                    period_hours: 720,
                },
            ],
            ..TenantLimitsConfig::default()
        };
        let limits = TenantLimits::compile("test", &config).unwrap();

        assert_eq!(
            limits.retention_hours(&labels(r#"{app="api", env="prod"}"#)),
            720
        );
        assert_eq!(limits.retention_hours(&labels(r#"{app="api"}"#)), 48);
        assert_eq!(limits.retention_hours(&labels(r#"{app="web"}"#)), 24);
    }

    #[test]
    fn test_policy_ties_break_on_name() {
        let mut mapping = BTreeMap::new();
        let rule = || {
            vec![PolicyStreamRule {
                selector: r#"{team="core"}"#.to_string(),
                priority: 1,
            }]
        };
        mapping.insert("zeta".to_string(), rule());
        mapping.insert("alpha".to_string(), rule());
        let config = TenantLimitsConfig {
            policy_stream_mapping: mapping,
            ..TenantLimitsConfig::default()
        };
        let limits = TenantLimits::compile("test", &config).unwrap();

        assert_eq!(limits.policy(&labels(r#"{team="core"}"#)), Some("alpha"));
        assert_eq!(limits.policy(&labels(r#"{team="edge"}"#)), None);
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let config = TenantLimitsConfig {
            drop_streams: vec!["{env=dev}".to_string()],
            ..TenantLimitsConfig::default()
        };
        let err = TenantLimits::compile("tenant t", &config).unwrap_err();
        assert!(matches!(err, LimitsError::InvalidSelector { .. }));
    }

    #[test]
    fn test_runtime_limits_overrides() {
        let mut config = LimitsConfig::default();
        config.overrides.insert(
            "verbose".to_string(),
            TenantLimitsConfig {
                log_push_request: true,
                log_push_request_streams: true,
                ..TenantLimitsConfig::default()
            },
        );
        let limits = RuntimeLimits::from_config(&config).unwrap();

        assert!(limits.log_push_request(&tenant("verbose")));
        assert!(limits.log_push_request_streams(&tenant("verbose")));
        assert!(!limits.log_push_request(&tenant("quiet")));
        assert_eq!(
            limits
                .tenant_limits(&tenant("quiet"))
                .unwrap()
                .retention_period_hours,
            744
        );
    }

    #[test]
    fn test_reload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[overrides.t1]\nretention_period_hours = 12").unwrap();

        let config = LimitsConfig {
            overrides_path: Some(file.path().to_string_lossy().to_string()),
            ..LimitsConfig::default()
        };
        let limits = RuntimeLimits::from_config(&config).unwrap();
        let before = limits.tenant_limits(&tenant("t1")).unwrap();
        assert_eq!(before.retention_period_hours, 12);

        std::fs::write(file.path(), "[overrides.t1]\nretention_period_hours = 36\n").unwrap();
        limits.reload().unwrap();

        assert_eq!(
            limits
                .tenant_limits(&tenant("t1"))
                .unwrap()
                .retention_period_hours,
            36
        );
        // Snapshots handed out earlier are unaffected.
        assert_eq!(before.retention_period_hours, 12);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[overrides.t1]\nlog_push_request = true\n").unwrap();
        let config = LimitsConfig {
            overrides_path: Some(file.path().to_string_lossy().to_string()),
            ..LimitsConfig::default()
        };
        let limits = RuntimeLimits::from_config(&config).unwrap();

        std::fs::write(file.path(), "[overrides.t1\n").unwrap();
        assert!(limits.reload().is_err());
        assert!(limits.log_push_request(&tenant("t1")));
    }
}
