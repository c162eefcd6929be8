// Protocol-specific error responses
//
// The push orchestrator decides the status and message; an ErrorWriter
// decides how they look on the wire for the endpoint that was called.

use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use prost::Message;

/// Renders an error response for one push protocol
pub trait ErrorWriter: Send + Sync {
    fn write_error(&self, message: &str, status: StatusCode) -> Response;
}

/// Native push endpoint: the message is the body, as plain text
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpErrorWriter;

impl ErrorWriter for HttpErrorWriter {
    fn write_error(&self, message: &str, status: StatusCode) -> Response {
        (
            status,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            message.to_string(),
        )
            .into_response()
    }
}

/// `google.rpc.Status`, the error body OTLP/HTTP clients expect
#[derive(Clone, PartialEq, Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

/// OTLP endpoint: protobuf `Status` body
#[derive(Debug, Default, Clone, Copy)]
pub struct OtlpErrorWriter;

impl ErrorWriter for OtlpErrorWriter {
    fn write_error(&self, message: &str, status: StatusCode) -> Response {
        // OTLP clients never retry a 500 but do retry a 503.
        let status = if status == StatusCode::INTERNAL_SERVER_ERROR {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            status
        };

        // The code field stays unset; the HTTP status carries it.
        let body = RpcStatus {
            code: 0,
            message: message.to_string(),
        }
        .encode_to_vec();

        (status, [(CONTENT_TYPE, "application/x-protobuf")], body).into_response()
    }
}
