// Hand-off of parsed pushes to the distribution step
//
// A distributor failure either carries a complete HTTP response to forward
// verbatim, or is an opaque internal error.

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

use crate::push::PushRequest;
use crate::resolver::StreamResolver;

#[derive(Debug, Error)]
pub enum DistributeError {
    /// A downstream response to forward as-is
    #[error("{body}")]
    Http { status: u16, body: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DistributeError {
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        DistributeError::Http {
            status,
            body: body.into(),
        }
    }
}

/// The distribution step.
///
/// Callers drop the returned future when the request is cancelled, so
/// implementations must not rely on running to completion.
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn push(
        &self,
        request: PushRequest,
        resolver: &StreamResolver,
    ) -> Result<(), DistributeError>;
}

/// Accepts every push, logging and counting what it received.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDistributor;

#[async_trait]
impl Distributor for TracingDistributor {
    async fn push(
        &self,
        request: PushRequest,
        resolver: &StreamResolver,
    ) -> Result<(), DistributeError> {
        let tenant = resolver.tenant().to_string();
        for stream in &request.streams {
            let policy = resolver.resolve(&stream.labels).map_err(anyhow::Error::from)?;
            counter!(
                "logpush_distributor_lines_accepted_total",
                stream.entries.len() as u64,
                "tenant" => tenant.clone(),
                "policy" => policy.policy.clone()
            );
            debug!(
                tenant = %tenant,
                stream = %stream.labels,
                entries = stream.entries.len(),
                retention_hours = %policy.retention_hours,
                policy = %policy.policy,
                "accepted stream"
            );
        }
        info!(
            tenant = %tenant,
            streams = request.streams.len(),
            entries = request.entry_count(),
            bytes = request.size(),
            "accepted push"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{Limits, LimitsError, TenantLimits};
    use crate::push::{Entry, Stream};
    use crate::tenant::TenantId;
    use chrono::Utc;
    use std::sync::Arc;
    use tracing::Span;

    struct FailingLimits;

    impl Limits for FailingLimits {
        fn tenant_limits(&self, tenant: &TenantId) -> Result<Arc<TenantLimits>, LimitsError> {
            Err(LimitsError::Unavailable {
                tenant: tenant.to_string(),
                message: "timeout".to_string(),
            })
        }
    }

    #[test]
    fn test_http_error_displays_body() {
        let err = DistributeError::http(429, "ingestion rate limit exceeded");
        assert_eq!(err.to_string(), "ingestion rate limit exceeded");
    }

    #[tokio::test]
    async fn test_tracing_distributor_surfaces_limits_errors() {
        let resolver = StreamResolver::new(
            TenantId::new("t1").unwrap(),
            Arc::new(FailingLimits),
            Span::none(),
        );
        let request = PushRequest {
            streams: vec![Stream::new(
                r#"{app="a"}"#.parse().unwrap(),
                vec![Entry::new(Utc::now(), "x")],
            )],
        };

        let err = TracingDistributor
            .push(request, &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, DistributeError::Other(_)));

        let ok = TracingDistributor
            .push(PushRequest::default(), &resolver)
            .await;
        assert!(ok.is_ok());
    }
}
