//! OTLP payloads and transport.
//!
//! - [`SyntheticTraceSource`]: random multi-span traces
//! - [`TemplateSource`]: replays spans from an OTLP JSON file with fresh timestamps
//! - [`OtlpGrpcSender`]: `TraceService/Export` over gRPC

mod grpc;
mod synthetic;
mod template;

pub use grpc::{OtlpGrpcSender, OtlpSenderConfig};
pub use synthetic::SyntheticTraceSource;
pub use template::{sample_request, TemplateSource};

pub use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn string_attr(key: &str, value: impl Into<String>) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.into())),
        }),
    }
}

pub(crate) fn int_attr(key: &str, value: i64) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::IntValue(value)),
        }),
    }
}

/// Current wall-clock time in Unix nanoseconds.
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Number of spans in an export request.
pub fn span_count(request: &ExportTraceServiceRequest) -> usize {
    request
        .resource_spans
        .iter()
        .flat_map(|rs| &rs.scope_spans)
        .map(|ss| ss.spans.len())
        .sum()
}
