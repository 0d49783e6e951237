use super::{string_attr, unix_nanos, ExportTraceServiceRequest};
use crate::batch::{Batch, BatchSource};
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{span::SpanKind, ResourceSpans, ScopeSpans, Span};
use rand::Rng;
use std::time::Duration;

const SCOPE_NAME: &str = "custom.generator";
const SCOPE_VERSION: &str = "1.0.0";

/// Generates random traces: a root SERVER span plus CLIENT/INTERNAL children
/// parented on it, all sharing one trace id.
///
/// A batch of `n` records holds `n` spans, split into traces of
/// `spans_per_trace` spans (the last trace may be shorter). Each trace is its
/// own `ResourceSpans`.
#[derive(Debug, Clone)]
pub struct SyntheticTraceSource {
    service_name: String,
    spans_per_trace: usize,
    span_duration: Duration,
}

impl SyntheticTraceSource {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            spans_per_trace: 3,
            span_duration: Duration::from_millis(100),
        }
    }

    /// Sets the number of spans per generated trace (at least 1).
    pub fn with_spans_per_trace(mut self, spans: usize) -> Self {
        self.spans_per_trace = spans.max(1);
        self
    }

    pub fn with_span_duration(mut self, duration: Duration) -> Self {
        self.span_duration = duration;
        self
    }

    /// Builds one trace of `span_count` spans.
    pub fn generate_trace(&self, rng: &mut impl Rng, span_count: usize) -> ResourceSpans {
        let trace_id = rng.gen::<[u8; 16]>().to_vec();
        let root = self.generate_span(rng, "/api/root".to_string(), &trace_id, None, SpanKind::Server);

        let mut spans = Vec::with_capacity(span_count.max(1));
        let root_id = root.span_id.clone();
        spans.push(root);
        for i in 0..span_count.saturating_sub(1) {
            let kind = if rng.gen_bool(0.5) {
                SpanKind::Client
            } else {
                SpanKind::Internal
            };
            spans.push(self.generate_span(rng, format!("op-{i}"), &trace_id, Some(&root_id), kind));
        }

        ResourceSpans {
            resource: Some(Resource {
                attributes: vec![string_attr("service.name", self.service_name.as_str())],
                ..Default::default()
            }),
            scope_spans: vec![ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: SCOPE_NAME.to_string(),
                    version: SCOPE_VERSION.to_string(),
                    ..Default::default()
                }),
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn generate_span(
        &self,
        rng: &mut impl Rng,
        name: String,
        trace_id: &[u8],
        parent_id: Option<&[u8]>,
        kind: SpanKind,
    ) -> Span {
        let start = unix_nanos();
        let end = start.saturating_add(u64::try_from(self.span_duration.as_nanos()).unwrap_or(u64::MAX));

        let method = ["GET", "POST", "PUT"][rng.gen_range(0..3)];
        let env = ["prod", "staging", "dev"][rng.gen_range(0..3)];
        let user = format!("user-{}", rng.gen_range(1000..=9999));

        Span {
            trace_id: trace_id.to_vec(),
            span_id: rng.gen::<[u8; 8]>().to_vec(),
            parent_span_id: parent_id.map(<[u8]>::to_vec).unwrap_or_default(),
            name,
            kind: kind as i32,
            start_time_unix_nano: start,
            end_time_unix_nano: end,
            attributes: vec![
                string_attr("http.method", method),
                string_attr("user.id", user),
                string_attr("env", env),
                string_attr("service.name", self.service_name.as_str()),
                string_attr("cloud.provider", "aws"),
                string_attr("cloud.account.id", "376129846044"),
                string_attr("cloud.region", "us-west-2"),
                string_attr("cloud.platform", "aws_ec2"),
                string_attr("host.name", "localhost"),
            ],
            ..Default::default()
        }
    }
}

impl Default for SyntheticTraceSource {
    fn default() -> Self {
        Self::new("example-service")
    }
}

impl BatchSource for SyntheticTraceSource {
    type Payload = ExportTraceServiceRequest;

    fn next_batch(&self, size: usize) -> Batch<ExportTraceServiceRequest> {
        let mut rng = rand::thread_rng();
        let mut resource_spans = Vec::with_capacity(size.div_ceil(self.spans_per_trace));

        let mut remaining = size;
        while remaining > 0 {
            let spans = remaining.min(self.spans_per_trace);
            resource_spans.push(self.generate_trace(&mut rng, spans));
            remaining -= spans;
        }

        Batch::new(ExportTraceServiceRequest { resource_spans }, size)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
