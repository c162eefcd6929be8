//! Core of the log push endpoint: tenant identity, stream labels, tenant
//! limits and request-scoped policy resolution, the parsing pipeline, and
//! the interfaces of the collaborators the push handler drives.

pub mod codec;
pub mod discarded;
pub mod distributor;
pub mod labels;
pub mod limits;
pub mod parser;
pub mod push;
pub mod resolver;
pub mod tenant;
pub mod write_failures;

pub use codec::{JsonPushParser, OtlpJsonParser};
pub use discarded::{DiscardReason, DiscardedBytes, MetricsDiscardedBytes};
pub use distributor::{DistributeError, Distributor, TracingDistributor};
pub use labels::{Labels, LabelsError, Selector};
pub use limits::{Limits, LimitsError, RuntimeLimits, TenantConfigs, TenantLimits};
pub use parser::{
    parse_request, BodyStatus, Instrumented, ParseContext, ParseError, ParserWrapper, RawRequest,
    RequestParser,
};
pub use push::{Entry, PushRequest, Stream};
pub use resolver::{StreamPolicy, StreamResolver};
pub use tenant::{tenant_id_from_headers, TenantError, TenantId, TenantSource, ORG_ID_HEADER};
pub use write_failures::{WriteFailures, WriteFailuresManager};
