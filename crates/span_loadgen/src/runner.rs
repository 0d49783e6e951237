//! Scenario runner: sequences phases through the dispatcher.

use crate::batch::BatchSource;
use crate::config::{PhaseOverrides, ScenarioCatalog};
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::{DispatchError, LoadError};
use crate::phase::Scenario;
use crate::report::ScenarioSummary;
use crate::scheduler::RatePlan;
use crate::sender::BatchSender;
use crate::shutdown::ShutdownSignal;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs scenarios phase by phase.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    dispatcher: Dispatcher,
}

impl ScenarioRunner {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
        }
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handle that stops the running scenario after the in-flight sends.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.dispatcher.shutdown_signal()
    }

    /// Looks up `name` in `catalog` and runs it.
    pub async fn run_named<S, T>(
        &self,
        catalog: &ScenarioCatalog,
        name: &str,
        overrides: &PhaseOverrides,
        source: Arc<S>,
        sender: Arc<T>,
    ) -> Result<ScenarioSummary, LoadError>
    where
        S: BatchSource + ?Sized + 'static,
        T: BatchSender<S::Payload> + 'static,
    {
        let scenario = catalog.scenario(name, overrides)?;
        self.run(&scenario, source, sender).await
    }

    /// Runs every phase of `scenario` in order.
    ///
    /// All phases are validated before the first one starts. A phase starts
    /// only after the previous one has fully drained.
    pub async fn run<S, T>(
        &self,
        scenario: &Scenario,
        source: Arc<S>,
        sender: Arc<T>,
    ) -> Result<ScenarioSummary, LoadError>
    where
        S: BatchSource + ?Sized + 'static,
        T: BatchSender<S::Payload> + 'static,
    {
        let plans = plan_all(scenario)?;
        let shutdown = self.dispatcher.shutdown_signal();
        let mut summary = ScenarioSummary::new(&scenario.name);

        info!(
            scenario = %scenario.name,
            phases = scenario.phases.len(),
            nominal_secs = scenario.nominal_duration(),
            "starting scenario"
        );

        for (index, (phase, plan)) in scenario.phases.iter().zip(plans).enumerate() {
            if shutdown.is_shutdown() {
                summary.cancelled = true;
                break;
            }

            info!(
                phase = index + 1,
                spans_per_second = phase.target_rate,
                duration_seconds = phase.duration_seconds,
                batch_size = phase.batch_size,
                concurrency = phase.concurrency,
                batches = plan.total_batches,
                "starting phase"
            );

            let outcome = self
                .dispatcher
                .run_plan(phase, plan, Arc::clone(&source), Arc::clone(&sender))
                .await;

            match outcome {
                Ok(result) => {
                    info!(phase = index + 1, "{}", result);
                    // only a shutdown leaves a successful phase short of its plan
                    summary.cancelled = result.cancelled;
                    summary.phases.push(result);
                    if summary.cancelled {
                        break;
                    }
                }
                Err(DispatchError::TransportUnavailable { cause, partial }) => {
                    warn!(phase = index + 1, %cause, "aborting scenario, endpoint unavailable");
                    summary.phases.push(partial);
                    return Err(LoadError::TransportUnavailable {
                        cause,
                        completed: summary.phases,
                    });
                }
                Err(DispatchError::InvalidPhase(reason)) => {
                    return Err(LoadError::InvalidPhaseConfig {
                        phase: index,
                        source: reason,
                    });
                }
            }
        }

        if summary.cancelled {
            warn!(scenario = %scenario.name, "scenario cancelled");
        }
        Ok(summary)
    }
}

/// Validates every phase up front so a bad later phase fails before any
/// earlier one sends.
fn plan_all(scenario: &Scenario) -> Result<Vec<RatePlan>, LoadError> {
    if scenario.phases.is_empty() {
        return Err(LoadError::InvalidPhaseConfig {
            phase: 0,
            source: crate::error::PhaseError::NoPhases,
        });
    }

    scenario
        .phases
        .iter()
        .enumerate()
        .map(|(phase, p)| RatePlan::for_phase(p).map_err(|source| LoadError::InvalidPhaseConfig { phase, source }))
        .collect()
}
