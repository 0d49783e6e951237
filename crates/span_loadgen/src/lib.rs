//! OTLP Span Load Generator
//!
//! Drives a trace collector with a scenario of phases. Each phase emits batches
//! at a target records-per-second rate for a fixed duration, with a bounded
//! number of sends in flight:
//!
//! - [`RatePlan`] turns a [`Phase`] into a batch count and a send interval.
//! - [`Dispatcher`] runs one phase as producer → bounded queue → worker pool and
//!   returns a [`PhaseResult`] once everything has drained.
//! - [`ScenarioRunner`] runs the phases of a [`Scenario`] in order.
//!
//! Payloads come from a [`BatchSource`] and leave through a [`BatchSender`];
//! the [`otlp`] module provides OTLP implementations of both.
//!
//! ```no_run
//! use span_loadgen::{NullSender, Phase, Scenario, ScenarioRunner, SyntheticTraceSource};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), span_loadgen::LoadError> {
//! let scenario = Scenario::single("smoke", Phase::new(1000.0, 10.0, 100, 4));
//! let summary = ScenarioRunner::default()
//!     .run(&scenario, Arc::new(SyntheticTraceSource::default()), Arc::new(NullSender))
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
mod invariants;
pub mod otlp;
pub mod phase;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod sender;
pub mod shutdown;

// Re-export main types
pub use batch::{Batch, BatchSource, CountingSource};
pub use config::{PhaseOverrides, ScenarioCatalog, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, LoadError, PhaseError, SendError};
pub use otlp::{OtlpGrpcSender, OtlpSenderConfig, SyntheticTraceSource, TemplateSource};
pub use phase::{Phase, Scenario};
pub use report::{PhaseResult, PhaseTally, ScenarioSummary};
pub use runner::ScenarioRunner;
pub use scheduler::{IntervalPacer, Pacer, RatePlan};
pub use sender::{BatchSender, BatchSenderBoxed, NullSender, SendOutcome, SendStatus};
pub use shutdown::ShutdownSignal;
