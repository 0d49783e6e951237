use clap::Parser;
use span_loadgen::otlp::ExportTraceServiceRequest;
use span_loadgen::{
    BatchSenderBoxed, BatchSource, DispatcherConfig, LoadError, NullSender, OtlpGrpcSender, OtlpSenderConfig,
    PhaseOverrides, ScenarioCatalog, ScenarioRunner, SyntheticTraceSource, TemplateSource,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit code for a run stopped by Ctrl+C.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "span_loadgen")]
#[command(about = "Phased, rate-controlled OTLP trace load generator", long_about = None)]
#[command(version)]
struct Cli {
    /// gRPC collector endpoint, e.g. localhost:4317
    #[arg(long, env = "SPAN_LOADGEN_TARGET", required_unless_present_any = ["dry_run", "list"])]
    target: Option<String>,

    /// Path to the scenario config JSON file
    #[arg(long)]
    config: PathBuf,

    /// Scenario name to execute
    #[arg(long, required_unless_present = "list")]
    scenario: Option<String>,

    /// OTLP JSON span file used as a template (random traces when absent)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Spans per request, overriding the scenario file
    #[arg(long)]
    batch: Option<usize>,

    /// Concurrent workers, overriding the scenario file
    #[arg(long)]
    concurrency: Option<usize>,

    /// Spans per generated trace (ignored with --input)
    #[arg(long, default_value = "3")]
    spans_per_trace: usize,

    /// Deadline for a single export call, in milliseconds
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Gzip-compress export requests
    #[arg(long)]
    gzip: bool,

    /// Run the scenario without a collector, discarding every batch
    #[arg(long)]
    dry_run: bool,

    /// List the scenarios in --config and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            if let LoadError::TransportUnavailable { completed, .. } = &e {
                for (i, phase) in completed.iter().enumerate() {
                    println!("  phase {}: {}", i + 1, phase);
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, LoadError> {
    let catalog = ScenarioCatalog::load(&cli.config)?;

    if cli.list {
        for name in catalog.names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let name = cli.scenario.as_deref().unwrap_or_default();
    let overrides = PhaseOverrides {
        batch_size: cli.batch,
        concurrency: cli.concurrency,
    };
    // resolve before connecting so config errors never touch the network
    let scenario = catalog.scenario(name, &overrides)?;

    let source: Arc<dyn BatchSource<Payload = ExportTraceServiceRequest>> = match &cli.input {
        Some(path) => {
            let template = TemplateSource::load(path)?;
            info!(path = %path.display(), spans = template.template_len(), "loaded span template");
            Arc::new(template)
        }
        None => Arc::new(SyntheticTraceSource::default().with_spans_per_trace(cli.spans_per_trace)),
    };

    let sender: Box<dyn BatchSenderBoxed<ExportTraceServiceRequest>> = match (&cli.target, cli.dry_run) {
        (Some(target), false) => {
            let config = OtlpSenderConfig::new(target.as_str()).with_gzip(cli.gzip);
            Box::new(OtlpGrpcSender::connect(&config).await?)
        }
        _ => {
            info!("dry run, batches are discarded");
            Box::new(NullSender)
        }
    };

    let runner = ScenarioRunner::new(DispatcherConfig::default().with_send_timeout(Duration::from_millis(cli.timeout_ms)));

    let shutdown = runner.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight sends");
            shutdown.shutdown();
        }
    });

    let summary = runner.run(&scenario, source, Arc::new(sender)).await?;
    println!("{summary}");

    if summary.cancelled {
        Ok(ExitCode::from(EXIT_CANCELLED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();
}
