// Write-failure audit log
//
// Failed pushes are logged per tenant at warn level, throttled by a
// per-tenant byte budget so a misbehaving client cannot flood the logs.

use logpush_config::WriteFailuresConfig;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::limits::TenantConfigs;
use crate::tenant::TenantId;

/// Sink for failed writes. Must accept concurrent calls from any request.
pub trait WriteFailures: Send + Sync {
    fn log(&self, tenant: &TenantId, error: &anyhow::Error);
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

/// Rate-limited audit sink backed by `tracing`
pub struct WriteFailuresManager {
    rate_bytes_per_sec: f64,
    burst_bytes: f64,
    add_insights_label: bool,
    tenant_configs: Arc<dyn TenantConfigs>,
    buckets: Mutex<HashMap<TenantId, Bucket>>,
}

impl WriteFailuresManager {
    pub fn new(config: &WriteFailuresConfig, tenant_configs: Arc<dyn TenantConfigs>) -> Self {
        Self {
            rate_bytes_per_sec: config.rate_bytes_per_sec as f64,
            burst_bytes: config.burst_bytes as f64,
            add_insights_label: config.add_insights_label,
            tenant_configs,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether the failure was written to the log.
    fn log_at(&self, tenant: &TenantId, error: &anyhow::Error, now: Instant) -> bool {
        if !self.tenant_configs.limited_log_push_errors(tenant) {
            return false;
        }

        let details = format!("{:#}", error);
        if !self.allow(tenant, details.len(), now) {
            counter!(
                "logpush_write_failures_discarded_total",
                1,
                "tenant" => tenant.to_string()
            );
            return false;
        }

        if self.add_insights_label {
            warn!(org_id = %tenant, details = %details, insight = true, "write operation failed");
        } else {
            warn!(org_id = %tenant, details = %details, "write operation failed");
        }
        counter!(
            "logpush_write_failures_logged_total",
            1,
            "tenant" => tenant.to_string()
        );
        true
    }

    fn allow(&self, tenant: &TenantId, cost: usize, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(tenant.clone()).or_insert(Bucket {
            tokens: self.burst_bytes,
            updated: now,
        });

        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_bytes_per_sec).min(self.burst_bytes);
        bucket.updated = now;

        let cost = cost as f64;
        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            true
        } else {
            false
        }
    }
}

impl WriteFailures for WriteFailuresManager {
    fn log(&self, tenant: &TenantId, error: &anyhow::Error) {
        self.log_at(tenant, error, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::time::Duration;

    struct Switch(bool);

    impl TenantConfigs for Switch {
        fn log_push_request(&self, _tenant: &TenantId) -> bool {
            false
        }
        fn log_push_request_streams(&self, _tenant: &TenantId) -> bool {
            false
        }
        fn limited_log_push_errors(&self, _tenant: &TenantId) -> bool {
            self.0
        }
    }

    fn manager(rate: u64, burst: u64, enabled: bool) -> WriteFailuresManager {
        let config = WriteFailuresConfig {
            rate_bytes_per_sec: rate,
            burst_bytes: burst,
            add_insights_label: false,
        };
        WriteFailuresManager::new(&config, Arc::new(Switch(enabled)))
    }

    #[test]
    fn test_burst_then_throttle() {
        let manager = manager(10, 20, true);
        let tenant = TenantId::new("t1").unwrap();
        let err = anyhow!("0123456789"); // 10 bytes
        let now = Instant::now();

        assert!(manager.log_at(&tenant, &err, now));
        assert!(manager.log_at(&tenant, &err, now));
        assert!(!manager.log_at(&tenant, &err, now));

        // One second refills ten bytes.
        assert!(manager.log_at(&tenant, &err, now + Duration::from_secs(1)));
    }

    #[test]
    fn test_tenants_have_separate_budgets() {
        let manager = manager(0, 10, true);
        let a = TenantId::new("a").unwrap();
        let b = TenantId::new("b").unwrap();
        let err = anyhow!("0123456789");
        let now = Instant::now();

        assert!(manager.log_at(&a, &err, now));
        assert!(!manager.log_at(&a, &err, now));
        assert!(manager.log_at(&b, &err, now));
    }

    #[test]
    fn test_disabled_tenant_is_not_logged() {
        let manager = manager(1000, 1000, false);
        let tenant = TenantId::new("t1").unwrap();
        assert!(!manager.log_at(&tenant, &anyhow!("boom"), Instant::now()));
    }

    #[test]
    fn test_context_chain_is_logged() {
        let manager = manager(0, 64, true);
        let tenant = TenantId::new("t1").unwrap();
        let err = anyhow!("inner").context("couldn't parse push request");
        // "couldn't parse push request: inner" is 34 bytes
        assert!(manager.log_at(&tenant, &err, Instant::now()));
        assert!(!manager.log_at(&tenant, &err, Instant::now()));
    }
}
