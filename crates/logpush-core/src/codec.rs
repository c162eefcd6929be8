//! Reference JSON decoders for the two push endpoints.
//!
//! `JsonPushParser` accepts the native JSON push format and
//! `OtlpJsonParser` accepts OTLP/JSON log exports. Both only decode; size
//! limits, decompression and filtering happen in [`crate::parser::parse_request`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::labels::Labels;
use crate::parser::{ParseContext, ParseError, RawRequest, RequestParser};
use crate::push::{Entry, PushRequest, Stream};

/// Label used when an OTLP resource carries no attributes
pub const UNKNOWN_SERVICE_NAME: &str = "unknown_service";

fn timestamp_from_nanos(nanos: i64) -> Result<DateTime<Utc>, ParseError> {
    DateTime::from_timestamp(
        nanos.div_euclid(1_000_000_000),
        nanos.rem_euclid(1_000_000_000) as u32,
    )
    .ok_or_else(|| ParseError::invalid(format!("timestamp out of range: {}", nanos)))
}

fn nanos_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

// =============================================================================
// Native JSON push format
// =============================================================================

#[derive(Debug, Deserialize)]
struct JsonPushRequest {
    #[serde(default)]
    streams: Vec<JsonStream>,
}

#[derive(Debug, Deserialize)]
struct JsonStream {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// `{"streams":[{"stream":{"app":"api"},"values":[["<unix ns>","line",{..}]]}]}`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPushParser;

impl RequestParser for JsonPushParser {
    fn name(&self) -> &'static str {
        "loki"
    }

    fn parse(
        &self,
        _ctx: &ParseContext<'_>,
        _request: &RawRequest,
        body: &[u8],
    ) -> Result<PushRequest, ParseError> {
        let decoded: JsonPushRequest = serde_json::from_slice(body)
            .map_err(|e| ParseError::invalid(format!("failed to decode push request: {}", e)))?;

        let mut streams = Vec::with_capacity(decoded.streams.len());
        for (idx, stream) in decoded.streams.into_iter().enumerate() {
            if stream.stream.is_empty() {
                return Err(ParseError::invalid(format!("stream {} has no labels", idx)));
            }
            let labels = Labels::from_pairs(stream.stream)
                .map_err(|e| ParseError::invalid(e.to_string()))?;

            let mut entries = Vec::with_capacity(stream.values.len());
            for value in stream.values {
                entries.push(decode_json_entry(&labels, value)?);
            }
            streams.push(Stream::new(labels, entries));
        }

        Ok(PushRequest { streams })
    }
}

fn decode_json_entry(labels: &Labels, value: Vec<Value>) -> Result<Entry, ParseError> {
    let mut parts = value.into_iter();
    let (Some(ts), Some(Value::String(line))) = (parts.next(), parts.next()) else {
        return Err(ParseError::invalid(format!(
            "entry for stream {} must be [\"<unix ns>\", \"<line>\"]",
            labels
        )));
    };

    let nanos = nanos_from_value(&ts).ok_or_else(|| {
        ParseError::invalid(format!("invalid timestamp {} for stream {}", ts, labels))
    })?;
    let mut entry = Entry::new(timestamp_from_nanos(nanos)?, line);

    match parts.next() {
        None | Some(Value::Null) => {}
        Some(Value::Object(metadata)) => {
            for (key, value) in metadata {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                entry.structured_metadata.push((key, value));
            }
        }
        Some(other) => {
            return Err(ParseError::invalid(format!(
                "structured metadata must be an object, got {}",
                other
            )))
        }
    }

    Ok(entry)
}

// =============================================================================
// OTLP/JSON logs
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportLogsRequest {
    #[serde(default)]
    resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceLogs {
    #[serde(default)]
    resource: Option<Resource>,
    #[serde(default)]
    scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Default, Deserialize)]
struct Resource {
    #[serde(default)]
    attributes: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopeLogs {
    #[serde(default)]
    log_records: Vec<LogRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    #[serde(default)]
    time_unix_nano: Option<Value>,
    #[serde(default)]
    observed_time_unix_nano: Option<Value>,
    #[serde(default)]
    severity_text: Option<String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    attributes: Vec<KeyValue>,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    span_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: Option<Value>,
}

/// OTLP/JSON `ExportLogsServiceRequest`; resource attributes become labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct OtlpJsonParser;

impl RequestParser for OtlpJsonParser {
    fn name(&self) -> &'static str {
        "otlp"
    }

    fn parse(
        &self,
        _ctx: &ParseContext<'_>,
        _request: &RawRequest,
        body: &[u8],
    ) -> Result<PushRequest, ParseError> {
        let decoded: ExportLogsRequest = serde_json::from_slice(body).map_err(|e| {
            ParseError::invalid(format!("failed to decode OTLP logs request: {}", e))
        })?;

        // Resources with identical attributes collapse into one stream.
        let mut streams: Vec<Stream> = Vec::new();
        for resource_logs in decoded.resource_logs {
            let labels = resource_labels(&resource_logs.resource.unwrap_or_default())?;
            let mut entries = Vec::new();
            for record in resource_logs
                .scope_logs
                .into_iter()
                .flat_map(|s| s.log_records)
            {
                entries.push(otlp_entry(record)?);
            }
            if entries.is_empty() {
                continue;
            }

            match streams.iter_mut().find(|s| s.labels == labels) {
                Some(existing) => existing.entries.extend(entries),
                None => streams.push(Stream::new(labels, entries)),
            }
        }

        Ok(PushRequest { streams })
    }
}

fn resource_labels(resource: &Resource) -> Result<Labels, ParseError> {
    let mut pairs = BTreeMap::new();
    for attr in &resource.attributes {
        if let Some(value) = attr.value.as_ref().and_then(any_value_to_string) {
            pairs.insert(sanitize_label_name(&attr.key), value);
        }
    }
    if pairs.is_empty() {
        pairs.insert("service_name".to_string(), UNKNOWN_SERVICE_NAME.to_string());
    }
    Labels::from_pairs(pairs).map_err(|e| ParseError::invalid(e.to_string()))
}

fn otlp_entry(record: LogRecord) -> Result<Entry, ParseError> {
    let nanos = record
        .time_unix_nano
        .as_ref()
        .and_then(nanos_from_value)
        .filter(|n| *n > 0)
        .or_else(|| {
            record
                .observed_time_unix_nano
                .as_ref()
                .and_then(nanos_from_value)
                .filter(|n| *n > 0)
        });
    let timestamp = match nanos {
        Some(n) => timestamp_from_nanos(n)?,
        None => Utc::now(),
    };

    let line = record
        .body
        .as_ref()
        .and_then(any_value_to_string)
        .unwrap_or_default();
    let mut entry = Entry::new(timestamp, line);

    for attr in record.attributes {
        if let Some(value) = attr.value.as_ref().and_then(any_value_to_string) {
            entry
                .structured_metadata
                .push((sanitize_label_name(&attr.key), value));
        }
    }
    if let Some(severity) = record.severity_text.filter(|s| !s.is_empty()) {
        entry
            .structured_metadata
            .push(("severity_text".to_string(), severity));
    }
    if let Some(trace_id) = record.trace_id.filter(|s| !s.is_empty()) {
        entry
            .structured_metadata
            .push(("trace_id".to_string(), trace_id));
    }
    if let Some(span_id) = record.span_id.filter(|s| !s.is_empty()) {
        entry
            .structured_metadata
            .push(("span_id".to_string(), span_id));
    }

    Ok(entry)
}

/// Render an OTLP `AnyValue` as a string; `None` for empty values
fn any_value_to_string(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if let Some(v) = object.get("stringValue") {
        return v.as_str().map(String::from);
    }
    if let Some(v) = object.get("boolValue") {
        return v.as_bool().map(|b| b.to_string());
    }
    if let Some(v) = object.get("intValue") {
        return match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };
    }
    if let Some(v) = object.get("doubleValue") {
        return v.as_f64().map(|f| f.to_string());
    }
    object
        .get("arrayValue")
        .or_else(|| object.get("kvlistValue"))
        .or_else(|| object.get("bytesValue"))
        .map(|v| v.to_string())
}

/// Map an attribute key onto the label name charset
fn sanitize_label_name(key: &str) -> String {
    let mut out: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
