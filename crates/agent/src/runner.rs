//! Drives flow runs. One tokio task per run, steps strictly sequential,
//! the run snapshot persisted after every step, progress events fanned out
//! through a per-run broadcast channel with full history replay for late
//! subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};

use dealforge_core::{
    FlowError, FlowInput, FlowName, FlowRun, FlowRunId, FlowRunRepository, FlowRunStatus,
    MonitoringState, ProgressEvent, ProgressEventKind, ProposalState, QualificationState,
    StepResult,
};

use crate::steps::{
    monitoring_pipeline, proposal_pipeline, qualification_pipeline, FlowStep, StepContext,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Clone, Copy, Debug)]
pub struct RunnerConfig {
    /// Extra attempts granted to a step after a retryable failure before
    /// the failure becomes fatal.
    pub step_max_retries: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { step_max_retries: 1 }
    }
}

struct RunHandle {
    events: broadcast::Sender<ProgressEvent>,
    history: Arc<Mutex<Vec<ProgressEvent>>>,
    cancel: watch::Sender<bool>,
}

impl RunHandle {
    fn emit(
        &self,
        run: &FlowRun,
        kind: ProgressEventKind,
        step: Option<&str>,
        message: Option<String>,
    ) {
        let mut history = lock_unpoisoned(&self.history);
        let event = ProgressEvent {
            run_id: run.id.clone(),
            seq: history.len() as u64,
            kind,
            step: step.map(str::to_string),
            status: run.status,
            message,
            occurred_at: Utc::now(),
        };
        history.push(event.clone());
        drop(history);
        // No live subscribers is fine; history covers late ones.
        let _ = self.events.send(event);
    }
}

struct Inner {
    ctx: Arc<StepContext>,
    runs: Arc<dyn FlowRunRepository>,
    config: RunnerConfig,
    registry: Mutex<HashMap<FlowRunId, Arc<RunHandle>>>,
}

#[derive(Clone)]
pub struct FlowRunner {
    inner: Arc<Inner>,
}

impl FlowRunner {
    pub fn new(
        ctx: StepContext,
        runs: Arc<dyn FlowRunRepository>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: Arc::new(ctx),
                runs,
                config,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts a run for a raw flow name. The name is validated before any
    /// state is created; an unknown name leaves no trace.
    pub async fn trigger(&self, flow: &str, input: FlowInput) -> Result<FlowRunId, FlowError> {
        let flow: FlowName = flow.parse()?;
        self.trigger_flow(flow, input).await
    }

    pub async fn trigger_flow(
        &self,
        flow: FlowName,
        input: FlowInput,
    ) -> Result<FlowRunId, FlowError> {
        let run = FlowRun::new(flow, input.deal.id.clone());
        let run_id = run.id.clone();
        self.inner.runs.save(&run).await?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel, cancel_rx) = watch::channel(false);
        let handle = Arc::new(RunHandle {
            events,
            history: Arc::new(Mutex::new(Vec::new())),
            cancel,
        });
        lock_unpoisoned(&self.inner.registry).insert(run_id.clone(), handle.clone());

        tracing::info!(
            event_name = "flow_run_triggered",
            run_id = %run_id,
            deal_id = %input.deal.id,
            flow = flow.as_str(),
            "flow run triggered"
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            execute_run(inner, run, input, handle, cancel_rx).await;
        });

        Ok(run_id)
    }

    /// Reads the persisted snapshot, which is current as of the last
    /// completed step.
    pub async fn status(&self, id: &FlowRunId) -> Result<FlowRun, FlowError> {
        self.inner.runs.load(id).await?.ok_or_else(|| FlowError::NotFound(id.clone()))
    }

    /// Streams progress events: full history replay first, then the live
    /// feed, ending at the terminal event. Subscribers arriving after the
    /// run finished still receive the terminal event.
    pub async fn subscribe(
        &self,
        id: &FlowRunId,
    ) -> Result<mpsc::Receiver<ProgressEvent>, FlowError> {
        let handle = lock_unpoisoned(&self.inner.registry).get(id).cloned();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        if let Some(handle) = handle {
            // Subscribe before snapshotting history so no event can fall
            // between the two; seq numbers dedup the overlap.
            let mut live = handle.events.subscribe();
            let snapshot = lock_unpoisoned(&handle.history).clone();

            tokio::spawn(async move {
                let mut last_seq = None;
                for event in snapshot {
                    last_seq = Some(event.seq);
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
                loop {
                    match live.recv().await {
                        Ok(event) => {
                            if last_seq.is_some_and(|last| event.seq <= last) {
                                continue;
                            }
                            last_seq = Some(event.seq);
                            let terminal = event.is_terminal();
                            if tx.send(event).await.is_err() {
                                return;
                            }
                            if terminal {
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            });
            return Ok(rx);
        }

        // Not in the in-process registry (e.g. after a restart): deliver a
        // single event synthesized from the persisted snapshot.
        let run = self.status(id).await?;
        let kind = match run.status {
            FlowRunStatus::Completed => ProgressEventKind::RunCompleted,
            FlowRunStatus::Failed => ProgressEventKind::RunFailed,
            _ => ProgressEventKind::StepCompleted,
        };
        let event = ProgressEvent {
            run_id: run.id.clone(),
            seq: 0,
            kind,
            step: run.current_step.clone(),
            status: run.status,
            message: run.error.clone(),
            occurred_at: run.updated_at,
        };
        let _ = tx.send(event).await;
        Ok(rx)
    }

    /// Requests cancellation. The run stops at the next step boundary;
    /// work already persisted is retained.
    pub async fn cancel(&self, id: &FlowRunId) -> Result<(), FlowError> {
        let handle = lock_unpoisoned(&self.inner.registry).get(id).cloned();
        if let Some(handle) = handle {
            let _ = handle.cancel.send(true);
            return Ok(());
        }
        // Unknown to this process: still surface NotFound for bogus ids.
        self.status(id).await.map(|_| ())
    }

    /// Number of runs currently tracked in-process. Terminal runs are
    /// evicted, so this counts live work.
    pub fn active_runs(&self) -> usize {
        lock_unpoisoned(&self.inner.registry).len()
    }
}

async fn execute_run(
    inner: Arc<Inner>,
    run: FlowRun,
    input: FlowInput,
    handle: Arc<RunHandle>,
    cancel: watch::Receiver<bool>,
) {
    let run_id = run.id.clone();
    match run.flow {
        FlowName::Qualification => {
            let state = QualificationState::from_input(&input);
            if let Some((run, _)) =
                drive(&inner, run, state, qualification_pipeline(), &handle, cancel).await
            {
                complete_run(&inner, &handle, run).await;
            }
        }
        FlowName::Proposal => {
            let state = ProposalState::from_input(&input);
            if let Some((run, _)) =
                drive(&inner, run, state, proposal_pipeline(), &handle, cancel).await
            {
                complete_run(&inner, &handle, run).await;
            }
        }
        FlowName::Monitoring => {
            let state = MonitoringState::from_input(&input);
            if let Some((run, _)) =
                drive(&inner, run, state, monitoring_pipeline(), &handle, cancel).await
            {
                complete_run(&inner, &handle, run).await;
            }
        }
    }

    // The run is terminal and its terminal event is in the broadcast
    // buffer; later subscribers are served from the persisted snapshot.
    lock_unpoisoned(&inner.registry).remove(&run_id);
}

/// Runs the pipeline to the last step, leaving the run in `Running`.
/// Returns `None` if the run failed or was cancelled (already persisted and
/// announced); the caller finalizes successful runs.
async fn drive<S: Serialize + Clone>(
    inner: &Inner,
    mut run: FlowRun,
    mut state: S,
    pipeline: Vec<Box<dyn FlowStep<S>>>,
    handle: &RunHandle,
    cancel: watch::Receiver<bool>,
) -> Option<(FlowRun, S)> {
    run.status = FlowRunStatus::Running;
    if !save(inner, handle, &mut run).await {
        return None;
    }

    for (index, step) in pipeline.iter().enumerate() {
        if *cancel.borrow() {
            fail_run(inner, handle, &mut run, "cancelled").await;
            return None;
        }

        run.current_step = Some(step.id().to_string());
        run.step_index = index;
        run.status = FlowRunStatus::Running;
        if !save(inner, handle, &mut run).await {
            return None;
        }
        handle.emit(&run, ProgressEventKind::StepStarted, Some(step.id()), None);

        let mut attempt: u32 = 0;
        loop {
            match step.execute(&state, &inner.ctx).await {
                StepResult::Ok { state: next, message } => {
                    state = next;
                    match serde_json::to_value(&state) {
                        Ok(value) => run.state_json = value,
                        Err(error) => {
                            fail_run(
                                inner,
                                handle,
                                &mut run,
                                &format!("state serialization failed: {error}"),
                            )
                            .await;
                            return None;
                        }
                    }
                    run.steps_completed.push(step.id().to_string());
                    run.error = None;
                    if !save(inner, handle, &mut run).await {
                        return None;
                    }
                    handle.emit(&run, ProgressEventKind::StepCompleted, Some(step.id()), message);
                    break;
                }
                StepResult::Retryable { message } if attempt < inner.config.step_max_retries => {
                    attempt += 1;
                    run.status = FlowRunStatus::StepFailed;
                    run.error = Some(message.clone());
                    if !save(inner, handle, &mut run).await {
                        return None;
                    }
                    handle.emit(
                        &run,
                        ProgressEventKind::StepRetried,
                        Some(step.id()),
                        Some(message.clone()),
                    );
                    tracing::warn!(
                        event_name = "step_retried",
                        run_id = %run.id,
                        step = step.id(),
                        attempt,
                        message = %message,
                        "retrying step"
                    );
                    run.status = FlowRunStatus::Running;
                }
                StepResult::Retryable { message } => {
                    let message = format!("retries exhausted: {message}");
                    fail_run(inner, handle, &mut run, &message).await;
                    return None;
                }
                StepResult::Fatal { message } => {
                    fail_run(inner, handle, &mut run, &message).await;
                    return None;
                }
            }
        }
    }

    Some((run, state))
}

async fn complete_run(inner: &Inner, handle: &RunHandle, mut run: FlowRun) {
    run.status = FlowRunStatus::Completed;
    run.current_step = None;
    run.completed_at = Some(Utc::now());
    if !save(inner, handle, &mut run).await {
        return;
    }
    handle.emit(&run, ProgressEventKind::RunCompleted, None, None);
    tracing::info!(
        event_name = "flow_run_completed",
        run_id = %run.id,
        flow = run.flow.as_str(),
        "flow run completed"
    );
}

/// Marks the run failed with the given reason, retaining the state already
/// persisted from completed steps.
async fn fail_run(inner: &Inner, handle: &RunHandle, run: &mut FlowRun, reason: &str) {
    run.status = FlowRunStatus::Failed;
    run.error = Some(reason.to_string());
    run.completed_at = Some(Utc::now());
    run.updated_at = Utc::now();
    if let Err(error) = inner.runs.save(run).await {
        tracing::error!(
            event_name = "run_save_failed",
            run_id = %run.id,
            error = %error,
            "failed to persist failed run"
        );
    }
    handle.emit(run, ProgressEventKind::RunFailed, run.current_step.as_deref(), Some(reason.to_string()));
    tracing::warn!(
        event_name = "flow_run_failed",
        run_id = %run.id,
        flow = run.flow.as_str(),
        reason,
        "flow run failed"
    );
}

async fn save(inner: &Inner, handle: &RunHandle, run: &mut FlowRun) -> bool {
    run.updated_at = Utc::now();
    match inner.runs.save(run).await {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(
                event_name = "run_save_failed",
                run_id = %run.id,
                error = %error,
                "failed to persist run snapshot"
            );
            run.status = FlowRunStatus::Failed;
            run.error = Some(format!("storage failure: {error}"));
            run.completed_at = Some(Utc::now());
            handle.emit(
                run,
                ProgressEventKind::RunFailed,
                run.current_step.as_deref(),
                run.error.clone(),
            );
            false
        }
    }
}
