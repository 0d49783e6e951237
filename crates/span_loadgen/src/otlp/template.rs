use super::{int_attr, span_count, string_attr, unix_nanos, ExportTraceServiceRequest};
use crate::batch::{Batch, BatchSource};
use crate::error::LoadError;
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{span::SpanKind, status::StatusCode, ResourceSpans, ScopeSpans, Span, Status};
use std::path::Path;

/// Replays the spans of a template request.
///
/// Every batch carries the template's spans, cycled until the requested size
/// is reached, under the template's first resource and scope. Each span is
/// shifted to start "now" and keeps its original duration.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    resource: Option<Resource>,
    scope: Option<InstrumentationScope>,
    schema_url: String,
    spans: Vec<Span>,
}

impl TemplateSource {
    /// Builds a source from a request. Returns `None` if it holds no spans.
    pub fn from_request(request: ExportTraceServiceRequest) -> Option<Self> {
        if span_count(&request) == 0 {
            return None;
        }

        let mut resource_spans = request.resource_spans.into_iter();
        let first = resource_spans.next()?;
        let scope = first.scope_spans.first().and_then(|ss| ss.scope.clone());
        let resource = first.resource;
        let schema_url = first.schema_url;

        let spans = first
            .scope_spans
            .into_iter()
            .chain(resource_spans.flat_map(|rs| rs.scope_spans))
            .flat_map(|ss| ss.spans)
            .collect();

        Some(Self {
            resource,
            scope,
            schema_url,
            spans,
        })
    }

    /// Loads an OTLP JSON `ExportTraceServiceRequest` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let request: ExportTraceServiceRequest = serde_json::from_str(&text).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_request(request).ok_or_else(|| LoadError::EmptyTemplate {
            path: path.to_path_buf(),
        })
    }

    /// Number of distinct spans in the template.
    pub fn template_len(&self) -> usize {
        self.spans.len()
    }
}

impl BatchSource for TemplateSource {
    type Payload = ExportTraceServiceRequest;

    fn next_batch(&self, size: usize) -> Batch<ExportTraceServiceRequest> {
        let now = unix_nanos();
        let spans = self
            .spans
            .iter()
            .cycle()
            .take(size)
            .map(|template| {
                let duration = template.end_time_unix_nano.saturating_sub(template.start_time_unix_nano);
                Span {
                    start_time_unix_nano: now,
                    end_time_unix_nano: now.saturating_add(duration),
                    ..template.clone()
                }
            })
            .collect();

        let request = ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: self.resource.clone(),
                scope_spans: vec![ScopeSpans {
                    scope: self.scope.clone(),
                    spans,
                    ..Default::default()
                }],
                schema_url: self.schema_url.clone(),
                ..Default::default()
            }],
        };
        Batch::new(request, size)
    }

    fn name(&self) -> &str {
        "template"
    }
}

const SAMPLE_TRACE_ID: [u8; 16] = [
    0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
];
const SAMPLE_SPAN_ID: [u8; 8] = [0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7];

/// A valid single-span request timestamped now, with a 1ms duration.
pub fn sample_request() -> ExportTraceServiceRequest {
    let start = unix_nanos();

    let span = Span {
        trace_id: SAMPLE_TRACE_ID.to_vec(),
        span_id: SAMPLE_SPAN_ID.to_vec(),
        name: "GET /ping".to_string(),
        kind: SpanKind::Client as i32,
        start_time_unix_nano: start,
        end_time_unix_nano: start + 1_000_000,
        attributes: vec![
            string_attr("http.method", "GET"),
            string_attr("http.url", "https://example.com/ping"),
            int_attr("http.status_code", 200),
            string_attr("net.peer.ip", "198.51.100.1"),
        ],
        status: Some(Status {
            code: StatusCode::Unset as i32,
            ..Default::default()
        }),
        ..Default::default()
    };

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(Resource {
                attributes: vec![
                    string_attr("service.name", "test-service"),
                    string_attr("cloud.provider", "aws"),
                    string_attr("cloud.account.id", "123456789012"),
                    string_attr("aws.region", "us-west-2"),
                    string_attr("aws.log.group.name", "/aws/xray/spans"),
                    string_attr("aws.log.stream.name", "default"),
                ],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: "demo-client".to_string(),
                    version: "1.0.0".to_string(),
                    ..Default::default()
                }),
                spans: vec![span],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_resource_request() -> ExportTraceServiceRequest {
        let mut request = sample_request();
        let mut second = request.resource_spans[0].clone();
        second.scope_spans[0].spans[0].name = "GET /health".to_string();
        request.resource_spans.push(second);
        request
    }

    #[test]
    fn test_cycles_template_spans_to_size() {
        let source = TemplateSource::from_request(two_resource_request()).unwrap();
        assert_eq!(source.template_len(), 2);

        let batch = source.next_batch(5);
        assert_eq!(batch.records(), 5);
        assert_eq!(span_count(batch.payload()), 5);

        let spans = &batch.payload().resource_spans[0].scope_spans[0].spans;
        let names: Vec<_> = spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["GET /ping", "GET /health", "GET /ping", "GET /health", "GET /ping"]);
    }

    #[test]
    fn test_refreshes_timestamps_and_keeps_duration() {
        let mut request = sample_request();
        let span = &mut request.resource_spans[0].scope_spans[0].spans[0];
        span.start_time_unix_nano = 1_000;
        span.end_time_unix_nano = 6_000;

        let source = TemplateSource::from_request(request).unwrap();
        let batch = source.next_batch(1);
        let span = &batch.payload().resource_spans[0].scope_spans[0].spans[0];
        assert!(span.start_time_unix_nano > 1_000);
        assert_eq!(span.end_time_unix_nano - span.start_time_unix_nano, 5_000);
        assert_eq!(span.trace_id, SAMPLE_TRACE_ID.to_vec());
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let mut request = sample_request();
        let span = &mut request.resource_spans[0].scope_spans[0].spans[0];
        span.start_time_unix_nano = 0;
        span.end_time_unix_nano = u64::MAX;

        let source = TemplateSource::from_request(request).unwrap();
        let batch = source.next_batch(2);
        for span in &batch.payload().resource_spans[0].scope_spans[0].spans {
            assert!(span.start_time_unix_nano > 0);
            assert_eq!(span.end_time_unix_nano, u64::MAX);
        }
    }

    #[test]
    fn test_keeps_first_resource_and_scope() {
        let source = TemplateSource::from_request(sample_request()).unwrap();
        let batch = source.next_batch(2);
        let rs = &batch.payload().resource_spans[0];
        assert_eq!(rs.resource.as_ref().unwrap().attributes[0], string_attr("service.name", "test-service"));
        assert_eq!(rs.scope_spans[0].scope.as_ref().unwrap().name, "demo-client");
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(TemplateSource::from_request(ExportTraceServiceRequest::default()).is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = TemplateSource::load("/nonexistent/sample-span.json").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
