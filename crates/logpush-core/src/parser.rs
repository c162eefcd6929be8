// Push request parsing pipeline
//
// parse_request bounds and decompresses the body, hands it to a
// format-specific RequestParser, then applies the tenant's drop rules and
// records per-stream received bytes. Format parsers only see the
// decompressed bytes.

use bytes::Bytes;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::HeaderMap;
use metrics::{counter, histogram};
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, Span};

use crate::limits::{Limits, LimitsError};
use crate::push::PushRequest;
use crate::resolver::StreamResolver;
use crate::tenant::TenantId;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("request body too large: exceeds limit of {limit} bytes")]
    BodyTooLarge { limit: usize },
    /// Every stream was removed by the tenant's drop rules. Not a failure.
    #[error("all entries in the push request were filtered")]
    AllLogsFiltered,
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("failed to decompress request body: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Limits(#[from] LimitsError),
}

impl ParseError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ParseError::Invalid(message.into())
    }
}

/// How far the transport got reading the body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodyStatus {
    #[default]
    Complete,
    /// Reading stopped at the size limit; `body` is empty
    ExceededLimit,
    /// The body could not be read
    Unreadable(String),
}

/// The inbound request as seen by the parsing pipeline
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
    pub status: BodyStatus,
}

impl RawRequest {
    pub fn new(headers: HeaderMap, body: Bytes) -> Self {
        Self {
            headers,
            body,
            status: BodyStatus::Complete,
        }
    }

    pub fn with_status(headers: HeaderMap, status: BodyStatus) -> Self {
        Self {
            headers,
            body: Bytes::new(),
            status,
        }
    }

    /// Declared body length; -1 when the header is absent or unparsable
    pub fn content_length(&self) -> i64 {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(-1)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Everything a format parser may consult while decoding one request
pub struct ParseContext<'a> {
    pub tenant: &'a TenantId,
    pub max_size: usize,
    pub limits: &'a dyn Limits,
    pub resolver: &'a StreamResolver,
    /// Log every parsed stream at debug level
    pub log_streams: bool,
    pub span: &'a Span,
}

/// Format-specific decoding of a push body
pub trait RequestParser: Send + Sync {
    /// Short format name used in logs and metric labels
    fn name(&self) -> &'static str;

    fn parse(
        &self,
        ctx: &ParseContext<'_>,
        request: &RawRequest,
        body: &[u8],
    ) -> Result<PushRequest, ParseError>;
}

/// Decorates a base parser before it is used for a request
pub trait ParserWrapper: Send + Sync {
    fn wrap(&self, parser: Arc<dyn RequestParser>) -> Arc<dyn RequestParser>;
}

/// Parse a push request end to end.
pub fn parse_request(
    ctx: &ParseContext<'_>,
    request: &RawRequest,
    parser: &dyn RequestParser,
) -> Result<PushRequest, ParseError> {
    let body = read_body(request, ctx.max_size)?;
    let mut push = parser.parse(ctx, request, &body)?;

    let before = push.streams.len();
    let mut filtered_lines = 0usize;
    let mut kept = Vec::with_capacity(before);
    for stream in push.streams {
        if ctx.resolver.is_dropped(&stream.labels)? {
            filtered_lines += stream.entries.len();
            continue;
        }
        kept.push(stream);
    }
    push.streams = kept;

    if filtered_lines > 0 || push.streams.len() < before {
        counter!(
            "logpush_distributor_lines_filtered_total",
            filtered_lines as u64,
            "tenant" => ctx.tenant.to_string()
        );
    }
    if before > 0 && push.streams.is_empty() {
        return Err(ParseError::AllLogsFiltered);
    }

    for stream in &push.streams {
        let policy = ctx.resolver.resolve(&stream.labels)?;
        counter!(
            "logpush_distributor_bytes_received_total",
            stream.size() as u64,
            "tenant" => ctx.tenant.to_string(),
            "retention_hours" => policy.retention_hours.clone(),
            "policy" => policy.policy.clone()
        );
        counter!(
            "logpush_distributor_lines_received_total",
            stream.entries.len() as u64,
            "tenant" => ctx.tenant.to_string()
        );
        if ctx.log_streams {
            debug!(
                parent: ctx.span,
                stream = %stream.labels,
                entries = stream.entries.len(),
                bytes = stream.size(),
                retention_hours = %policy.retention_hours,
                policy = %policy.policy,
                "push request stream"
            );
        }
    }

    Ok(push)
}

/// Return the body bytes, decompressed if needed, refusing anything that
/// exceeds `max_size` before or after decompression.
fn read_body(request: &RawRequest, max_size: usize) -> Result<Bytes, ParseError> {
    match &request.status {
        BodyStatus::Complete => {}
        BodyStatus::ExceededLimit => return Err(ParseError::BodyTooLarge { limit: max_size }),
        BodyStatus::Unreadable(reason) => {
            return Err(ParseError::invalid(format!(
                "failed to read request body: {}",
                reason
            )))
        }
    }
    if request.body.len() > max_size {
        return Err(ParseError::BodyTooLarge { limit: max_size });
    }

    match request.content_encoding().map(str::to_ascii_lowercase) {
        None => Ok(request.body.clone()),
        Some(enc) if enc == "identity" => Ok(request.body.clone()),
        Some(enc) if enc == "gzip" => {
            bounded_read(MultiGzDecoder::new(request.body.as_ref()), max_size).map(Bytes::from)
        }
        Some(enc) if enc == "deflate" => {
            bounded_read(ZlibDecoder::new(request.body.as_ref()), max_size).map(Bytes::from)
        }
        Some(enc) => Err(ParseError::UnsupportedEncoding(enc)),
    }
}

fn bounded_read<R: Read>(reader: R, max_size: usize) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    reader
        .take((max_size as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(ParseError::Decompress)?;
    if out.len() > max_size {
        return Err(ParseError::BodyTooLarge { limit: max_size });
    }
    Ok(out)
}

/// Records parse latency and failures per format
#[derive(Debug, Default, Clone, Copy)]
pub struct Instrumented;

impl ParserWrapper for Instrumented {
    fn wrap(&self, parser: Arc<dyn RequestParser>) -> Arc<dyn RequestParser> {
        Arc::new(InstrumentedParser { inner: parser })
    }
}

pub struct InstrumentedParser {
    inner: Arc<dyn RequestParser>,
}

impl RequestParser for InstrumentedParser {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn parse(
        &self,
        ctx: &ParseContext<'_>,
        request: &RawRequest,
        body: &[u8],
    ) -> Result<PushRequest, ParseError> {
        let start = Instant::now();
        let result = self.inner.parse(ctx, request, body);
        histogram!(
            "logpush_request_parse_duration_seconds",
            start.elapsed().as_secs_f64(),
            "format" => self.inner.name()
        );
        if result.is_err() {
            counter!("logpush_request_parse_failures_total", 1, "format" => self.inner.name());
        }
        result
    }
}
