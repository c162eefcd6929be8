//! Request-scoped retention and policy resolution.
//!
//! One resolver is built per push request and shared by the parser and the
//! distributor. The tenant's limits are read once, on first use, and every
//! decision is memoised, so all lookups for a label set within the request
//! agree even if the limits are reloaded concurrently.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, Span};

use crate::labels::Labels;
use crate::limits::{Limits, LimitsError, TenantLimits};
use crate::tenant::TenantId;

/// Retention and policy for one stream, in the form used as metric labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StreamPolicy {
    pub retention_hours: String,
    /// Empty when no policy mapping matches
    pub policy: String,
}

pub struct StreamResolver {
    tenant: TenantId,
    limits: Arc<dyn Limits>,
    span: Span,
    snapshot: OnceCell<Arc<TenantLimits>>,
    decided: Mutex<HashMap<Labels, StreamPolicy>>,
}

impl StreamResolver {
    pub fn new(tenant: TenantId, limits: Arc<dyn Limits>, span: Span) -> Self {
        Self {
            tenant,
            limits,
            span,
            snapshot: OnceCell::new(),
            decided: Mutex::new(HashMap::new()),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Tenant limits as first observed by this request.
    /// A failed read is returned to the caller and retried on the next call.
    pub fn tenant_limits(&self) -> Result<&Arc<TenantLimits>, LimitsError> {
        self.snapshot
            .get_or_try_init(|| self.limits.tenant_limits(&self.tenant))
    }

    pub fn resolve(&self, labels: &Labels) -> Result<StreamPolicy, LimitsError> {
        if let Some(decided) = self.decided.lock().get(labels) {
            return Ok(decided.clone());
        }

        let limits = self.tenant_limits()?;
        let decision = StreamPolicy {
            retention_hours: limits.retention_hours(labels).to_string(),
            policy: limits.policy(labels).unwrap_or_default().to_string(),
        };

        let mut decided = self.decided.lock();
        let decision = decided.entry(labels.clone()).or_insert(decision).clone();
        debug!(
            parent: &self.span,
            tenant = %self.tenant,
            stream = %labels,
            retention_hours = %decision.retention_hours,
            policy = %decision.policy,
            "resolved stream policy"
        );
        Ok(decision)
    }

    /// Whether the tenant's drop rules filter this stream out
    pub fn is_dropped(&self, labels: &Labels) -> Result<bool, LimitsError> {
        Ok(self.tenant_limits()?.is_dropped(labels))
    }
}

impl std::fmt::Debug for StreamResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResolver")
            .field("tenant", &self.tenant)
            .field("decided", &self.decided.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpush_config::{RetentionStreamRule, TenantLimitsConfig};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Limits whose default retention changes on every read
    struct DriftingLimits {
        reads: AtomicU64,
    }

    impl Limits for DriftingLimits {
        fn tenant_limits(&self, _tenant: &TenantId) -> Result<Arc<TenantLimits>, LimitsError> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            let config = TenantLimitsConfig {
                retention_period_hours: 24 * (n + 1),
                retention_stream: vec![RetentionStreamRule {
                    selector: r#"{app="audit"}"#.to_string(),
                    priority: 1,
                    period_hours: 1000 + n,
                }],
                ..TenantLimitsConfig::default()
            };
            Ok(Arc::new(TenantLimits::compile("drift", &config)?))
        }
    }

    struct FailingLimits;

    impl Limits for FailingLimits {
        fn tenant_limits(&self, tenant: &TenantId) -> Result<Arc<TenantLimits>, LimitsError> {
            Err(LimitsError::Unavailable {
                tenant: tenant.to_string(),
                message: "store offline".to_string(),
            })
        }
    }

    fn resolver(limits: Arc<dyn Limits>) -> StreamResolver {
        StreamResolver::new(TenantId::new("t1").unwrap(), limits, Span::none())
    }

    #[test]
    fn test_consistent_within_request() {
        let limits = Arc::new(DriftingLimits {
            reads: AtomicU64::new(0),
        });
        let resolver = resolver(limits.clone());
        let audit: Labels = r#"{app="audit"}"#.parse().unwrap();
        let web: Labels = r#"{app="web"}"#.parse().unwrap();

        let first = resolver.resolve(&audit).unwrap();
        let again = resolver.resolve(&audit).unwrap();
        let other = resolver.resolve(&web).unwrap();

        assert_eq!(first, again);
        assert_eq!(first.retention_hours, "1000");
        assert_eq!(other.retention_hours, "24");
        assert_eq!(first.policy, "");
        assert_eq!(limits.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_new_request_sees_new_limits() {
        let limits = Arc::new(DriftingLimits {
            reads: AtomicU64::new(0),
        });
        let labels: Labels = r#"{app="web"}"#.parse().unwrap();

        let a = resolver(limits.clone()).resolve(&labels).unwrap();
        let b = resolver(limits).resolve(&labels).unwrap();
        assert_ne!(a.retention_hours, b.retention_hours);
    }

    #[test]
    fn test_limits_error_propagates() {
        let resolver = resolver(Arc::new(FailingLimits));
        let labels: Labels = r#"{app="web"}"#.parse().unwrap();

        let err = resolver.resolve(&labels).unwrap_err();
        assert!(err.to_string().contains("store offline"));
        assert!(resolver.is_dropped(&labels).is_err());
    }
}
