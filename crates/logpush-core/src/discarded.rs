//! Discarded-bytes accounting.

use metrics::counter;

use crate::tenant::TenantId;

/// Why data was discarded; rendered into the `reason` metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// The body could not be read within the size limit
    RequestBodyTooLarge,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::RequestBodyTooLarge => "request_body_too_large",
        }
    }
}

/// Process-wide discarded-bytes counter
pub trait DiscardedBytes: Send + Sync {
    fn add(
        &self,
        reason: DiscardReason,
        tenant: &TenantId,
        retention_hours: &str,
        policy: &str,
        bytes: u64,
    );
}

/// Emits `logpush_discarded_bytes_total` through the `metrics` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsDiscardedBytes;

impl DiscardedBytes for MetricsDiscardedBytes {
    fn add(
        &self,
        reason: DiscardReason,
        tenant: &TenantId,
        retention_hours: &str,
        policy: &str,
        bytes: u64,
    ) {
        counter!(
            "logpush_discarded_bytes_total",
            bytes,
            "reason" => reason.as_str(),
            "tenant" => tenant.to_string(),
            "retention_hours" => retention_hours.to_string(),
            "policy" => policy.to_string()
        );
    }
}
