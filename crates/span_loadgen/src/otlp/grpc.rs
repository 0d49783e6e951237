use super::ExportTraceServiceRequest;
use crate::batch::Batch;
use crate::error::{LoadError, SendError};
use crate::sender::BatchSender;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceResponse;
use std::time::Duration;
use tonic::codec::CompressionEncoding;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};
use tracing::info;

/// Connection settings for [`OtlpGrpcSender`].
#[derive(Debug, Clone)]
pub struct OtlpSenderConfig {
    /// Collector address, e.g. `localhost:4317` or `http://collector:4317`.
    /// A missing scheme defaults to `http://`.
    pub endpoint: String,

    /// Default: 5s
    pub connect_timeout: Duration,

    /// Gzip-compress request bodies.
    ///
    /// Default: false
    pub gzip: bool,
}

impl OtlpSenderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_timeout: Duration::from_secs(5),
            gzip: false,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Endpoint URI with the scheme filled in.
    pub fn uri(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

/// Sends batches with `TraceService/Export`.
///
/// The underlying channel multiplexes concurrent calls, so one sender is
/// shared by every worker.
#[derive(Debug, Clone)]
pub struct OtlpGrpcSender {
    client: TraceServiceClient<Channel>,
    uri: String,
}

impl OtlpGrpcSender {
    /// Connects to the collector. Failure to connect is reported as
    /// [`LoadError::TransportUnavailable`].
    pub async fn connect(config: &OtlpSenderConfig) -> Result<Self, LoadError> {
        let uri = config.uri();
        let endpoint = Endpoint::from_shared(uri.clone()).map_err(|e| LoadError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;

        let channel = endpoint
            .connect_timeout(config.connect_timeout)
            .connect()
            .await
            .map_err(|e| LoadError::TransportUnavailable {
                cause: format!("cannot connect to {uri}: {e}"),
                completed: Vec::new(),
            })?;

        let mut client = TraceServiceClient::new(channel);
        if config.gzip {
            client = client.send_compressed(CompressionEncoding::Gzip);
        }

        info!(endpoint = %uri, gzip = config.gzip, "connected to collector");
        Ok(Self { client, uri })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl BatchSender<ExportTraceServiceRequest> for OtlpGrpcSender {
    async fn send(&self, batch: Batch<ExportTraceServiceRequest>, deadline: Duration) -> Result<(), SendError> {
        let mut client = self.client.clone();
        let mut request = Request::new(batch.into_payload());
        request.set_timeout(deadline);

        match client.export(request).await {
            Ok(response) => check_partial_success(&response.into_inner()),
            Err(status) => Err(classify_status(&status)),
        }
    }

    fn name(&self) -> &str {
        "otlp-grpc"
    }
}

/// Maps a gRPC status onto a send error.
fn classify_status(status: &Status) -> SendError {
    match status.code() {
        Code::DeadlineExceeded => SendError::Timeout,
        Code::Unavailable => SendError::Unavailable(status.message().to_string()),
        code => SendError::Rejected(format!("{code:?}: {}", status.message())),
    }
}

/// A response may accept the call yet reject some spans.
fn check_partial_success(response: &ExportTraceServiceResponse) -> Result<(), SendError> {
    match &response.partial_success {
        Some(partial) if partial.rejected_spans > 0 => Err(SendError::Rejected(format!(
            "{} spans rejected: {}",
            partial.rejected_spans, partial.error_message
        ))),
        _ => Ok(()),
    }
}
