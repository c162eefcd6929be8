// Push request orchestration
//
// Resolves the tenant, parses the body with the protocol's parser, turns
// the parse outcome into a response and hands successful batches to the
// distributor. Every path ends in exactly one response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use logpush_core::{
    parse_request, DiscardReason, DiscardedBytes, DistributeError, Distributor, Limits,
    ParseContext, ParseError, ParserWrapper, PushRequest, RawRequest, RequestParser,
    StreamResolver, TenantConfigs, TenantId, TenantSource, WriteFailures,
};
use std::sync::Arc;
use tracing::{debug, error, Span};

use crate::error_writer::ErrorWriter;

/// What parsing produced, for response selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    BodyTooLarge,
    GenericParseFailure,
    AllFiltered,
    ParseSuccess,
}

/// The outcomes a parse error can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    BodyTooLarge,
    GenericParseFailure,
    AllFiltered,
}

impl ParseOutcome {
    pub fn classify(result: &Result<PushRequest, ParseError>) -> Self {
        match result {
            Ok(_) => ParseOutcome::ParseSuccess,
            Err(err) => ParseFailure::of_error(err).into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ParseOutcome::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ParseOutcome::GenericParseFailure => StatusCode::BAD_REQUEST,
            ParseOutcome::AllFiltered | ParseOutcome::ParseSuccess => StatusCode::NO_CONTENT,
        }
    }
}

impl ParseFailure {
    pub fn of_error(err: &ParseError) -> Self {
        match err {
            ParseError::BodyTooLarge { .. } => ParseFailure::BodyTooLarge,
            ParseError::AllLogsFiltered => ParseFailure::AllFiltered,
            ParseError::UnsupportedEncoding(_)
            | ParseError::Decompress(_)
            | ParseError::Invalid(_)
            | ParseError::Limits(_) => ParseFailure::GenericParseFailure,
        }
    }

    pub fn status(&self) -> StatusCode {
        ParseOutcome::from(*self).status()
    }
}

impl From<ParseFailure> for ParseOutcome {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::BodyTooLarge => ParseOutcome::BodyTooLarge,
            ParseFailure::GenericParseFailure => ParseOutcome::GenericParseFailure,
            ParseFailure::AllFiltered => ParseOutcome::AllFiltered,
        }
    }
}

/// Shared push handling for every push protocol
pub struct PushHandler {
    pub tenant_source: TenantSource,
    pub max_recv_msg_size: usize,
    pub limits: Arc<dyn Limits>,
    pub tenant_configs: Arc<dyn TenantConfigs>,
    pub parser_wrapper: Option<Arc<dyn ParserWrapper>>,
    pub distributor: Arc<dyn Distributor>,
    pub write_failures: Arc<dyn WriteFailures>,
    pub discarded: Arc<dyn DiscardedBytes>,
}

impl PushHandler {
    pub async fn handle(
        &self,
        request: RawRequest,
        parser: Arc<dyn RequestParser>,
        writer: &dyn ErrorWriter,
    ) -> Response {
        let span = Span::current();

        let tenant = match self.tenant_source.tenant_id(&request.headers) {
            Ok(tenant) => tenant,
            Err(err) => {
                error!(err = %err, "error getting tenant id");
                return writer.write_error(&err.to_string(), StatusCode::BAD_REQUEST);
            }
        };

        let parser = match &self.parser_wrapper {
            Some(wrapper) => wrapper.wrap(parser),
            None => parser,
        };

        let resolver = StreamResolver::new(tenant.clone(), Arc::clone(&self.limits), span.clone());
        let log_push_request = self.tenant_configs.log_push_request(&tenant);
        let log_streams = self.tenant_configs.log_push_request_streams(&tenant);

        let ctx = ParseContext {
            tenant: &tenant,
            max_size: self.max_recv_msg_size,
            limits: self.limits.as_ref(),
            resolver: &resolver,
            log_streams,
            span: &span,
        };
        let push = match parse_request(&ctx, &request, parser.as_ref()) {
            Ok(push) => push,
            Err(err) => {
                return self.parse_failed(&tenant, &request, err, log_push_request, writer);
            }
        };

        if log_streams {
            debug!(streams = %push.stream_labels(), "push request streams");
        }

        match self.distributor.push(push, &resolver).await {
            Ok(()) => {
                if log_push_request {
                    debug!("push request successful");
                }
                StatusCode::NO_CONTENT.into_response()
            }
            Err(DistributeError::Http { status, body }) => {
                if log_push_request {
                    debug!(code = status, err = %body, "push request failed");
                }
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                writer.write_error(&body, status)
            }
            Err(DistributeError::Other(err)) => {
                let message = format!("{:#}", err);
                if log_push_request {
                    debug!(
                        code = StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                        err = %message,
                        "push request failed"
                    );
                }
                writer.write_error(&message, StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn parse_failed(
        &self,
        tenant: &TenantId,
        request: &RawRequest,
        err: ParseError,
        log_push_request: bool,
        writer: &dyn ErrorWriter,
    ) -> Response {
        let outcome = ParseFailure::of_error(&err);
        let status = outcome.status();
        let message = err.to_string();

        match outcome {
            ParseFailure::BodyTooLarge => {
                if log_push_request {
                    debug!(code = status.as_u16(), err = %message, "push request failed");
                }
                self.write_failures.log(
                    tenant,
                    &anyhow::Error::new(err).context("couldn't decompress push request"),
                );

                // The body was never decoded, so stream retention and policy
                // are unknown and their labels stay empty.
                let content_length = request.content_length();
                if content_length > 0 {
                    self.discarded.add(
                        DiscardReason::RequestBodyTooLarge,
                        tenant,
                        "",
                        "",
                        content_length as u64,
                    );
                } else {
                    error!(
                        tenant = %tenant,
                        content_length,
                        "negative content length observed"
                    );
                }
                writer.write_error(&message, status)
            }
            ParseFailure::AllFiltered => {
                if log_push_request {
                    debug!("successful push request filtered all lines");
                }
                status.into_response()
            }
            ParseFailure::GenericParseFailure => {
                if log_push_request {
                    debug!(code = status.as_u16(), err = %message, "push request failed");
                }
                self.write_failures.log(
                    tenant,
                    &anyhow::Error::new(err).context("couldn't parse push request"),
                );
                writer.write_error(&message, status)
            }
        }
    }
}
