//! DAG scheduler.
//!
//! Orchestrates one workflow execution end-to-end: validates the graph,
//! groups nodes into dependency waves, and runs each wave with a bounded
//! worker pool. Per node it applies the incoming-edge gate, resolves the
//! configuration through the template engine, dispatches to the registered
//! executor under the retry policy and per-node timeout, enforces the
//! output-size limit, and publishes the output for downstream resolution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Scheduler                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  Workflow ──▶ ExecutionGraph ──▶ waves (Kahn's algorithm)    │
//! │                                     │                        │
//! │                  wave loop (sequential, happens-before)      │
//! │                                     │                        │
//! │              ┌───────── Semaphore(max_parallelism) ───────┐  │
//! │              ▼                 ▼                  ▼        │  │
//! │          node task         node task          node task    │  │
//! │        gate → resolve → execute (retry/timeout) → publish  │  │
//! │                                                            │  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Waves run strictly in order: every observable side effect of wave `w`
//! completes before any node of wave `w+1` starts. Within a wave, nodes are
//! unordered; the priority field is only a launch-order tiebreak.

pub mod gate;
pub mod graph;

use crate::expr::ConditionEvaluator;
use crate::registry::ExecutorRegistry;
use crate::template::TemplateEngine;
use chrono::Utc;
use futures::future::join_all;
use self::gate::{GateDecision, evaluate_gate};
use self::graph::ExecutionGraph;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use weft_kernel::{
    AggregatedError, EngineError, EngineResult, EventKind, ExecutionEvent, ExecutionObserver,
    ExecutionOptions, ExecutionPhase, ExecutionState, Node, NodeExecutionContext,
    NodeExecutionResult, NodeExecutor, NodeStatus, Value, Workflow, safe_notify,
};

/// The workflow scheduler.
///
/// Construct one per process, register executors, attach observers, and
/// call [`Scheduler::execute`] per execution.
pub struct Scheduler {
    registry: Arc<ExecutorRegistry>,
    template: Arc<TemplateEngine>,
    evaluator: Arc<ConditionEvaluator>,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl Scheduler {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            registry,
            template: Arc::new(TemplateEngine::new()),
            evaluator: Arc::new(ConditionEvaluator::new()),
            observers: Vec::new(),
        }
    }

    /// Replace the template engine (e.g. to run in strict mode).
    pub fn with_template_engine(mut self, template: TemplateEngine) -> Self {
        self.template = Arc::new(template);
        self
    }

    /// Replace the condition evaluator.
    pub fn with_condition_evaluator(mut self, evaluator: Arc<ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Attach an observer. Observers are notified synchronously from the
    /// emitting task and must be fast; panics are isolated.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Run one execution to completion.
    ///
    /// Returns `Ok(())` on success, the first node error in fail-fast mode,
    /// an [`EngineError::Aggregated`] in continue-on-error mode, a graph
    /// error when preflight fails, or [`EngineError::Cancelled`] when the
    /// ambient scope is cancelled before or during execution.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        state: Arc<ExecutionState>,
        options: &ExecutionOptions,
        cancel: CancellationToken,
    ) -> EngineResult<()> {
        // Preflight: structure and acyclicity, before any node runs.
        let graph = Arc::new(ExecutionGraph::build(workflow)?);
        let waves = graph.compute_waves()?;

        if cancel.is_cancelled() {
            state.mark_ended(ExecutionPhase::Cancelled);
            return Err(EngineError::Cancelled);
        }

        let ctx = Arc::new(ExecContext {
            workflow: Arc::new(workflow.clone()),
            graph,
            state: state.clone(),
            options: options.clone(),
            registry: self.registry.clone(),
            template: self.template.clone(),
            evaluator: self.evaluator.clone(),
            observers: Arc::new(self.observers.clone()),
            cancel,
        });

        state.mark_started();
        ctx.emit(ctx.event(EventKind::ExecutionStarted));
        info!(
            execution_id = %state.execution_id,
            workflow = %workflow.name,
            nodes = workflow.node_count(),
            waves = waves.len(),
            "starting workflow execution"
        );

        let started = Instant::now();
        let mut aggregated = AggregatedError::new();

        for (index, wave) in waves.into_iter().enumerate() {
            if let Err(err) = run_wave(&ctx, index, wave, &mut aggregated).await {
                return finish_failed(&ctx, started, err);
            }
        }

        if !aggregated.is_empty() {
            return finish_failed(&ctx, started, EngineError::Aggregated(aggregated));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        ctx.state.mark_ended(ExecutionPhase::Completed);
        ctx.emit(
            ctx.event(EventKind::ExecutionCompleted)
                .with_duration_ms(duration_ms)
                .with_status("completed"),
        );
        info!(
            execution_id = %ctx.state.execution_id,
            duration_ms,
            "workflow execution completed"
        );
        Ok(())
    }
}

/// Everything a node task needs, shared behind one `Arc`.
struct ExecContext {
    workflow: Arc<Workflow>,
    graph: Arc<ExecutionGraph>,
    state: Arc<ExecutionState>,
    options: ExecutionOptions,
    registry: Arc<ExecutorRegistry>,
    template: Arc<TemplateEngine>,
    evaluator: Arc<ConditionEvaluator>,
    observers: Arc<Vec<Arc<dyn ExecutionObserver>>>,
    cancel: CancellationToken,
}

impl ExecContext {
    fn event(&self, kind: EventKind) -> ExecutionEvent {
        ExecutionEvent::new(kind, &self.state.execution_id, &self.state.workflow_id)
    }

    fn node_event(&self, kind: EventKind, node: &Node) -> ExecutionEvent {
        self.event(kind)
            .with_node(&node.id, &node.name, &node.node_type)
    }

    fn emit(&self, event: ExecutionEvent) {
        safe_notify(self.observers.as_slice(), &event);
    }
}

fn finish_failed(ctx: &ExecContext, started: Instant, err: EngineError) -> EngineResult<()> {
    let duration_ms = started.elapsed().as_millis() as u64;
    let phase = if matches!(err, EngineError::Cancelled) {
        ExecutionPhase::Cancelled
    } else {
        ExecutionPhase::Failed
    };
    ctx.state.mark_ended(phase);
    ctx.emit(
        ctx.event(EventKind::ExecutionFailed)
            .with_error(&err)
            .with_duration_ms(duration_ms),
    );
    error!(
        execution_id = %ctx.state.execution_id,
        error = %err,
        duration_ms,
        "workflow execution failed"
    );
    Err(err)
}

/// Run one wave: sort by priority, fan out under the semaphore, join, and
/// either abort (fail-fast) or collect errors (continue-on-error).
async fn run_wave(
    ctx: &Arc<ExecContext>,
    index: usize,
    mut wave: Vec<String>,
    aggregated: &mut AggregatedError,
) -> EngineResult<()> {
    // Cancelled executions fail before the wave is announced.
    if ctx.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    // Descending priority; the sort is stable, so ties keep the wave
    // construction order.
    wave.sort_by_key(|id| {
        std::cmp::Reverse(ctx.workflow.node(id).map(|n| n.priority).unwrap_or(0))
    });

    let wave_size = wave.len();
    ctx.emit(ctx.event(EventKind::WaveStarted).with_wave(index, wave_size));
    debug!(wave = index, nodes = wave_size, "wave started");
    let wave_started = Instant::now();

    let permits = if ctx.options.max_parallelism <= 0 {
        wave_size.max(1)
    } else {
        ctx.options.max_parallelism as usize
    };
    let semaphore = Arc::new(Semaphore::new(permits));

    let mut ids = Vec::with_capacity(wave_size);
    let mut handles = Vec::with_capacity(wave_size);
    for node_id in wave {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let id = node_id.clone();
        ids.push(node_id);
        handles.push(tokio::spawn(async move {
            run_node(&ctx, &semaphore, &id).await
        }));
    }

    let mut errors: Vec<(String, EngineError)> = Vec::new();
    for (node_id, outcome) in ids.into_iter().zip(join_all(handles).await) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push((node_id, err)),
            Err(join_err) => {
                let err = EngineError::node(&node_id, format!("node task panicked: {join_err}"));
                errors.push((node_id, err));
            }
        }
    }

    let status = if errors.is_empty() {
        "completed"
    } else {
        "completed_with_errors"
    };
    ctx.emit(
        ctx.event(EventKind::WaveCompleted)
            .with_wave(index, wave_size)
            .with_duration_ms(wave_started.elapsed().as_millis() as u64)
            .with_status(status),
    );

    if errors.is_empty() {
        return Ok(());
    }

    // Whole-execution cancellation always propagates, regardless of mode.
    if let Some(pos) = errors
        .iter()
        .position(|(_, e)| matches!(e, EngineError::Cancelled))
    {
        return Err(errors.swap_remove(pos).1);
    }

    if ctx.options.continue_on_error {
        for (node_id, err) in errors {
            aggregated.push(node_id, err.to_string());
        }
        Ok(())
    } else {
        let (_, first) = errors.remove(0);
        for (node_id, err) in errors {
            debug!(node_id = %node_id, error = %err, "discarding error after fail-fast");
        }
        Err(first)
    }
}

/// The per-node task.
async fn run_node(
    ctx: &ExecContext,
    semaphore: &Semaphore,
    node_id: &str,
) -> EngineResult<()> {
    if ctx.cancel.is_cancelled() {
        return skip_node(ctx, node_id, "execution cancelled");
    }

    // The semaphore wait is a suspension point and observes cancellation.
    let _permit = tokio::select! {
        permit = semaphore.acquire() => permit.map_err(|_| EngineError::Cancelled)?,
        _ = ctx.cancel.cancelled() => {
            return skip_node(ctx, node_id, "execution cancelled");
        }
    };

    let node = ctx
        .workflow
        .node(node_id)
        .ok_or_else(|| EngineError::node(node_id, "node missing from workflow"))?;

    match evaluate_gate(
        node_id,
        ctx.graph.incoming_edges(node_id),
        &ctx.workflow,
        &ctx.state,
        &ctx.evaluator,
    ) {
        GateDecision::Run => {}
        GateDecision::Skip(reason) => return skip_node(ctx, node_id, &reason),
    }

    // Per-node deadline: the node's own timeout wins over the
    // execution-wide default; zero means none.
    let timeout = node
        .timeout_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .or_else(|| (ctx.options.node_timeout > Duration::ZERO).then_some(ctx.options.node_timeout));

    // Input bindings come from the parents' published outputs (plus any
    // include_outputs_from hints), layered over a snapshot of the variable
    // context taken now — sibling outputs within this wave stay invisible.
    let inputs = collect_inputs(ctx, node_id);
    let variables = ctx.state.variables_snapshot().child_with_inputs(inputs);

    let resolved_config = match ctx.template.resolve_value(&node.config, &variables) {
        Ok(config) => config,
        Err(err) => return fail_node(ctx, node, None, EngineError::Template(err)),
    };

    let Some(executor) = ctx.registry.get(&node.node_type) else {
        return fail_node(
            ctx,
            node,
            None,
            EngineError::UnknownNodeType(node.node_type.clone()),
        );
    };

    ctx.state.set_node_status(node_id, NodeStatus::Running);
    ctx.state.set_node_started_at(node_id, Utc::now());
    let started = Instant::now();
    ctx.emit(ctx.node_event(EventKind::NodeStarted, node).with_attempt(1));
    debug!(node_id, node_type = %node.node_type, "node started");

    let node_cancel = ctx.cancel.child_token();
    let exec_ctx = NodeExecutionContext {
        node: node.clone(),
        config: node.config.clone(),
        resolved_config,
        variables,
        options: ctx.options.clone(),
        cancel: node_cancel.clone(),
    };

    let result = match dispatch(ctx, node, &executor, &exec_ctx, timeout).await {
        Ok(result) => result,
        Err(err) => {
            if matches!(err, EngineError::DeadlineExceeded) {
                node_cancel.cancel();
            }
            return fail_node(ctx, node, Some(started), err);
        }
    };

    if ctx.options.max_output_size > 0 {
        let size = result.output.estimated_size();
        if size > ctx.options.max_output_size {
            return fail_node(
                ctx,
                node,
                Some(started),
                EngineError::OutputSizeExceeded {
                    node_id: node.id.clone(),
                    size,
                    limit: ctx.options.max_output_size,
                },
            );
        }
    }

    ctx.state.set_node_input(node_id, result.input);
    ctx.state.set_node_config(node_id, result.config);
    ctx.state
        .set_node_resolved_config(node_id, result.resolved_config);
    ctx.state.set_node_output(node_id, result.output.clone());
    ctx.state.set_node_status(node_id, NodeStatus::Completed);
    ctx.state.set_node_ended_at(node_id, Utc::now());

    let key = node.output_key();
    ctx.state.publish_output(key.clone(), result.output.clone());
    ctx.emit(
        ctx.node_event(EventKind::VariableSet, node)
            .with_variable_key(key)
            .with_output(result.output.clone()),
    );

    if ctx.options.max_total_memory > 0 {
        let total = ctx.state.total_memory_usage();
        if total > ctx.options.max_total_memory {
            warn!(
                total,
                limit = ctx.options.max_total_memory,
                "accumulated output size exceeds the advisory memory limit"
            );
            ctx.emit(ctx.event(EventKind::ExecutionWarning).with_reason(format!(
                "total output size {total} exceeds advisory limit {}",
                ctx.options.max_total_memory
            )));
        }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    ctx.emit(
        ctx.node_event(EventKind::NodeCompleted, node)
            .with_duration_ms(duration_ms)
            .with_output(result.output),
    );
    debug!(node_id, duration_ms, "node completed");
    Ok(())
}

/// Invoke the executor under the retry policy and the per-node deadline.
async fn dispatch(
    ctx: &ExecContext,
    node: &Node,
    executor: &Arc<dyn NodeExecutor>,
    exec_ctx: &NodeExecutionContext,
    timeout: Option<Duration>,
) -> EngineResult<NodeExecutionResult> {
    let call = async {
        match &ctx.options.retry_policy {
            Some(policy) => {
                policy
                    .execute(
                        &exec_ctx.cancel,
                        |attempt, err, delay| {
                            ctx.emit(
                                ctx.node_event(EventKind::NodeRetrying, node)
                                    .with_attempt(attempt)
                                    .with_reason(err.to_string())
                                    .with_duration_ms(delay.as_millis() as u64),
                            );
                        },
                        |_attempt| {
                            let executor = executor.clone();
                            async move { executor.execute(exec_ctx).await }
                        },
                    )
                    .await
            }
            None => executor.execute(exec_ctx).await,
        }
    };

    match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::DeadlineExceeded),
        },
        None => call.await,
    }
}

fn skip_node(ctx: &ExecContext, node_id: &str, reason: &str) -> EngineResult<()> {
    ctx.state.set_node_status(node_id, NodeStatus::Skipped);
    let event = match ctx.workflow.node(node_id) {
        Some(node) => ctx.node_event(EventKind::NodeSkipped, node),
        None => ctx.event(EventKind::NodeSkipped),
    };
    ctx.emit(event.with_reason(reason));
    debug!(node_id, reason, "node skipped");
    Ok(())
}

/// Record the failure on the node and hand the error to the wave collector.
fn fail_node(
    ctx: &ExecContext,
    node: &Node,
    started: Option<Instant>,
    err: EngineError,
) -> EngineResult<()> {
    let duration_ms = started.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0);
    ctx.state.set_node_error(&node.id, err.to_string());
    ctx.state.set_node_status(&node.id, NodeStatus::Failed);
    ctx.state.set_node_ended_at(&node.id, Utc::now());
    warn!(node_id = %node.id, error = %err, duration_ms, "node failed");
    ctx.emit(
        ctx.node_event(EventKind::NodeFailed, node)
            .with_error(&err)
            .with_duration_ms(duration_ms),
    );
    Err(err)
}

/// Parent-derived input bindings for a node, keyed by each source's
/// published output key.
fn collect_inputs(ctx: &ExecContext, node_id: &str) -> HashMap<String, Value> {
    let mut inputs = HashMap::new();
    for edge in ctx.graph.incoming_edges(node_id) {
        insert_published_output(ctx, &edge.from, &mut inputs);
        for extra in &edge.include_outputs_from {
            insert_published_output(ctx, extra, &mut inputs);
        }
    }
    inputs
}

fn insert_published_output(
    ctx: &ExecContext,
    source_id: &str,
    inputs: &mut HashMap<String, Value>,
) {
    if let Some(node) = ctx.workflow.node(source_id)
        && let Some(output) = ctx.state.node_output(source_id)
    {
        inputs.insert(node.output_key(), output);
    }
}
