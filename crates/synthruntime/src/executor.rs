use crate::aggregate;
use crate::config::RuntimeConfig;
use crate::graph::{determine_final_output_node, find_isolated_nodes, DependencyGraph};
use crate::registry::NodeRegistry;
use crate::resolver::{resolve_inputs, CompletedOutputs};
use futures::stream::{self, Stream};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use synthcore::{
    ExecutionMeta, NodeConfig, NodeContext, NodeError, NodeExecutionResult, NodeStatus, OutputMap, ProgressEmitter,
    ProgressEvent, StreamMessage, SynthError, WorkflowDefinition, WorkflowExecutionResult, WorkflowId, WorkflowStatus,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs workflow definitions node by node in topological order.
///
/// Nodes execute strictly one at a time, even when independent, so that
/// progress is reported in a deterministic order. The executor holds no
/// per-run state.
#[derive(Clone)]
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    strict_connections: bool,
    event_buffer_size: usize,
    poll_interval: Duration,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>, config: &RuntimeConfig) -> Self {
        Self {
            registry,
            strict_connections: config.strict_connections,
            event_buffer_size: config.event_buffer_size.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Execute a workflow and return the aggregated result. Never fails:
    /// problems are reported through the result's status and trace.
    pub async fn execute(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: &WorkflowDefinition,
        seed: OutputMap,
    ) -> WorkflowExecutionResult {
        self.run(workflow_id, definition, seed, &ProgressEmitter::disabled()).await
    }

    /// Start a run on a background task and hand back the consumer side
    /// of its progress queue.
    pub fn spawn_streaming(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: WorkflowDefinition,
        seed: OutputMap,
    ) -> ExecutionStream {
        let (sender, events) = mpsc::channel(self.event_buffer_size);
        let total_nodes = definition.nodes.len();
        let executor = self.clone();
        let handle = tokio::spawn(async move {
            let emitter = ProgressEmitter::new(sender);
            executor.run(workflow_id, &definition, seed, &emitter).await
        });

        ExecutionStream {
            events,
            handle,
            poll_interval: self.poll_interval,
            workflow_id,
            total_nodes,
        }
    }

    /// Streaming execution that forwards every progress event to
    /// `on_progress` on the calling task.
    pub async fn execute_with_progress<F>(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: WorkflowDefinition,
        seed: OutputMap,
        mut on_progress: F,
    ) -> Result<WorkflowExecutionResult, SynthError>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let mut stream = self.spawn_streaming(workflow_id, definition, seed);
        while let Some(event) = stream.next_event().await {
            on_progress(event);
        }
        stream.finish().await
    }

    async fn run(
        &self,
        workflow_id: Option<WorkflowId>,
        definition: &WorkflowDefinition,
        seed: OutputMap,
        emitter: &ProgressEmitter,
    ) -> WorkflowExecutionResult {
        let start_time = Instant::now();
        tracing::info!(
            workflow_id = ?workflow_id,
            nodes = definition.nodes.len(),
            connections = definition.connections.len(),
            "Starting workflow execution"
        );

        if let Err(e) = definition.validate(self.strict_connections) {
            tracing::warn!(workflow_id = ?workflow_id, error = %e, "Workflow rejected before execution");
            return WorkflowExecutionResult {
                workflow_id,
                results: Vec::new(),
                seed_data: seed,
                final_output: aggregate::diagnostic_output(e.to_string()),
                execution_time: start_time.elapsed().as_secs_f64(),
                status: WorkflowStatus::Error,
                output_node_results: Vec::new(),
                meta: ExecutionMeta {
                    warnings: vec![e.to_string()],
                    ..ExecutionMeta::default()
                },
            };
        }

        let graph = DependencyGraph::build(definition);
        let order = graph.execution_order();
        let output_nodes = aggregate::output_node_ids(definition);
        let final_node = determine_final_output_node(&order.nodes, &output_nodes);

        let mut meta = ExecutionMeta {
            execution_order: order.nodes.clone(),
            input_nodes: aggregate::input_node_ids(definition),
            output_nodes,
            isolated_nodes: find_isolated_nodes(definition, &graph),
            final_node: final_node.clone(),
            has_cycle: order.has_cycle,
            cycle_nodes: graph.cycles(),
            unknown_node_ids: graph.phantom_nodes(),
            warnings: Vec::new(),
        };
        if order.has_cycle {
            meta.warnings.push(format!(
                "Cycle detected; nodes {} were appended in definition order",
                order.unordered.join(", ")
            ));
        }
        if !meta.isolated_nodes.is_empty() {
            tracing::warn!(nodes = ?meta.isolated_nodes, "Workflow has isolated nodes");
        }
        if !meta.unknown_node_ids.is_empty() {
            meta.warnings.push(format!(
                "Connections reference undeclared nodes: {}",
                meta.unknown_node_ids.join(", ")
            ));
        }

        for node_id in &order.nodes {
            emitter.queued(node_id).await;
        }

        let mut completed = CompletedOutputs::new();
        let mut results = Vec::with_capacity(order.nodes.len());

        for node_id in &order.nodes {
            let Some(node) = definition.find_node(node_id) else {
                continue;
            };

            let result = self.run_node(node, definition, &completed, &seed, emitter).await;
            if result.is_success() {
                completed.insert(node_id.clone(), result.output.clone());
            }
            emitter.finished(&result).await;
            results.push(result);
        }

        let final_output = aggregate::select_final_output(definition, final_node.as_deref(), &results, &completed);
        let status = aggregate::overall_status(&results);
        let execution_time = start_time.elapsed().as_secs_f64();

        let result = WorkflowExecutionResult {
            workflow_id,
            output_node_results: aggregate::output_node_summaries(definition, &results),
            results,
            seed_data: seed,
            final_output,
            execution_time,
            status,
            meta,
        };

        tracing::info!(
            workflow_id = ?result.workflow_id,
            status = ?result.status,
            succeeded = result.succeeded(),
            total = result.results.len(),
            elapsed_ms = (execution_time * 1000.0) as u64,
            "Workflow execution finished"
        );

        result
    }

    async fn run_node(
        &self,
        node: &NodeConfig,
        definition: &WorkflowDefinition,
        completed: &CompletedOutputs,
        seed: &OutputMap,
        emitter: &ProgressEmitter,
    ) -> NodeExecutionResult {
        emitter.running(&node.id, 0.0).await;

        let inputs = resolve_inputs(node, definition, completed, seed);
        let snapshot = inputs.to_value();
        emitter.running(&node.id, 0.25).await;

        let executor = self.registry.create_node(node);
        emitter.running(&node.id, 0.5).await;

        tracing::debug!(node_id = %node.id, node_type = %node.node_type, inputs = inputs.len(), "Dispatching node");
        let started = Instant::now();
        let outcome = match executor {
            Ok(executor) => match executor.validate_config(node) {
                Ok(()) => {
                    let ctx = NodeContext::new(node.clone(), inputs);
                    AssertUnwindSafe(executor.execute(ctx))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(NodeError::ExecutionFailed(panic_message(panic))))
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(NodeError::NotFound(e.to_string())),
        };
        let execution_time = started.elapsed().as_secs_f64();
        emitter.running(&node.id, 0.75).await;

        let (output, status, error_message) = match outcome {
            Ok(output) => {
                tracing::info!(node_id = %node.id, elapsed_ms = (execution_time * 1000.0) as u64, "Node completed");
                (output.outputs, NodeStatus::Success, None)
            }
            Err(e) => {
                tracing::error!(node_id = %node.id, error = %e, "Node failed");
                (OutputMap::new(), NodeStatus::Error, Some(e.to_string()))
            }
        };

        NodeExecutionResult {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            node_name: node.name.clone(),
            input: snapshot,
            output,
            execution_time,
            status,
            error_message,
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("node panicked: {}", detail)
}

/// Consumer side of a streaming run.
pub struct ExecutionStream {
    events: mpsc::Receiver<ProgressEvent>,
    handle: JoinHandle<WorkflowExecutionResult>,
    poll_interval: Duration,
    workflow_id: Option<WorkflowId>,
    total_nodes: usize,
}

enum StreamPhase {
    Starting(ExecutionStream),
    Running(ExecutionStream),
    Done,
}

impl ExecutionStream {
    /// Next progress event, or `None` once the producer has finished and
    /// the queue is drained. Waits at most one poll interval at a time.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            let polled = tokio::time::timeout(self.poll_interval, self.events.recv()).await;
            match polled {
                Ok(event) => return event,
                Err(_) if self.handle.is_finished() => return self.events.try_recv().ok(),
                Err(_) => continue,
            }
        }
    }

    /// Wait for the producer and return its result.
    pub async fn finish(self) -> Result<WorkflowExecutionResult, SynthError> {
        self.handle
            .await
            .map_err(|e| SynthError::Execution(format!("Execution task failed: {}", e)))
    }

    /// Wire messages for this run: `init`, one `progress` per event, then
    /// a single `complete` (or `error` if the producer task died).
    pub fn into_messages(self) -> impl Stream<Item = StreamMessage> + Send {
        stream::unfold(StreamPhase::Starting(self), |phase| async move {
            match phase {
                StreamPhase::Starting(run) => {
                    let init = StreamMessage::init(run.workflow_id, run.total_nodes);
                    Some((init, StreamPhase::Running(run)))
                }
                StreamPhase::Running(mut run) => match run.next_event().await {
                    Some(event) => Some((StreamMessage::from(event), StreamPhase::Running(run))),
                    None => {
                        let last = match run.finish().await {
                            Ok(result) => StreamMessage::complete(result),
                            Err(e) => {
                                tracing::error!(error = %e, "Streaming run did not complete");
                                StreamMessage::error(e.to_string())
                            }
                        };
                        Some((last, StreamPhase::Done))
                    }
                },
                StreamPhase::Done => None,
            }
        })
    }
}
