//! Execution driver: runs a scheduled pipeline and routes its files

use crate::dag::{schedule_pump, ReadyCounter};
use crate::error::{PumpError, Result};
use crate::executors::{Invocation, NodeRunner};
use crate::graph::Pump;
use crate::models::{Direction, Edge, ExecutionResult, NodeHandle, NodeStatus, RunReport};
use crate::routing::{route_file, RouteMode};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives node execution in scheduled order
pub struct ExecutionDriver {
    runner: Arc<dyn NodeRunner>,
    workdir: PathBuf,
    max_parallel: usize,
}

/// Bookkeeping of one run
struct RunState {
    executed: Vec<String>,
    routed: usize,
    route_modes: Vec<RouteMode>,
}

impl ExecutionDriver {
    pub fn new(runner: Arc<dyn NodeRunner>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
            max_parallel: 1,
        }
    }

    /// Allow up to `max_parallel` independent nodes to run at once
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Run every node of `pump` once, after all of its inputs were routed.
    ///
    /// The first failure aborts the run: the failing node is marked
    /// `Failed`, nodes that never ran are marked `Skipped`, and the error is
    /// returned. Statuses stay readable on `pump` either way.
    pub async fn run(&self, pump: &mut Pump) -> Result<RunReport> {
        if !pump.is_scheduled() {
            pump.sort_edges();
            schedule_pump(pump)?;
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = RunState {
            executed: Vec::new(),
            routed: 0,
            route_modes: route_modes(pump.edges()),
        };

        let span = info_span!("run", %run_id);
        let outcome = async {
            info!(
                "Starting run of {} nodes in {:?} (max_parallel: {})",
                pump.nodes().len(),
                self.workdir,
                self.max_parallel
            );
            if self.max_parallel == 1 {
                self.run_sequential(pump, &mut state).await
            } else {
                self.run_concurrent(pump, &mut state).await
            }
        }
        .instrument(span)
        .await;

        if let Err(e) = outcome {
            abandon_remaining(pump);
            error!("Run {} aborted: {}", run_id, e);
            if !state.executed.is_empty() {
                warn!("Nodes completed before abort: {}", state.executed.join(", "));
            }
            return Err(e);
        }

        info!(
            "Run {} completed: {} nodes executed, {} edges routed",
            run_id,
            state.executed.len(),
            state.routed
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            executed: state.executed,
            routed_edges: state.routed,
        })
    }

    /// Reference walk: all sources first, then the scheduled edges one by one
    async fn run_sequential(&self, pump: &mut Pump, state: &mut RunState) -> Result<()> {
        let sources: Vec<NodeHandle> = pump
            .handles()
            .filter(|&handle| pump.node(handle).is_source())
            .collect();

        for handle in sources {
            self.execute_node(pump, handle, state).await?;
        }

        let edges = pump.edges().to_vec();
        let mut counter = ReadyCounter::new();

        for (index, edge) in edges.iter().enumerate() {
            info!(
                "Node '{}' has finished; processing edge {}",
                pump.node(edge.source).id(),
                pump.describe_edge(edge)
            );
            self.route_edge(pump, edge, state.route_modes[index]).await?;
            state.routed += 1;

            let target = pump.node(edge.target);
            if counter.satisfy(edge.target, target.input_arity()) {
                info!("Node '{}' is ready for execution", target.id());
                self.execute_node(pump, edge.target, state).await?;
            }
        }

        Ok(())
    }

    /// Single coordinator owning the ready counters; node processes run on a
    /// `JoinSet`, routing and counting happen here as each node finishes.
    async fn run_concurrent(&self, pump: &mut Pump, state: &mut RunState) -> Result<()> {
        let edges = pump.edges().to_vec();
        let mut outgoing: HashMap<NodeHandle, Vec<usize>> = HashMap::new();
        for (index, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source).or_default().push(index);
        }

        let mut ready: VecDeque<NodeHandle> = pump
            .handles()
            .filter(|&handle| pump.node(handle).is_source())
            .collect();
        let mut running: JoinSet<(NodeHandle, Result<ExecutionResult>)> = JoinSet::new();
        let mut counter = ReadyCounter::new();
        let mut failure: Option<PumpError> = None;

        loop {
            // Stop launching once something failed, but let in-flight nodes finish
            while failure.is_none() && running.len() < self.max_parallel {
                let Some(handle) = ready.pop_front() else {
                    break;
                };
                let invocation = Invocation::for_node(pump.node(handle), &self.workdir);
                pump.set_status(handle, NodeStatus::Running);
                debug!("Launching node '{}'", invocation.node);

                let runner = Arc::clone(&self.runner);
                running.spawn(async move {
                    let result = runner.execute(&invocation).await;
                    (handle, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };

            let (handle, result) = match joined {
                Ok(pair) => pair,
                Err(join_error) => {
                    error!("Node task aborted: {}", join_error);
                    failure.get_or_insert(PumpError::TaskAborted(join_error.to_string()));
                    continue;
                }
            };

            if let Err(e) = self.record(pump, handle, result, state) {
                failure.get_or_insert(e);
                continue;
            }
            if failure.is_some() {
                continue;
            }

            let indices = outgoing.get(&handle).map(Vec::as_slice).unwrap_or_default();
            for &index in indices {
                let edge = &edges[index];
                debug!("Processing edge {}", pump.describe_edge(edge));
                if let Err(e) = self.route_edge(pump, edge, state.route_modes[index]).await {
                    failure = Some(e);
                    break;
                }
                state.routed += 1;

                let target = pump.node(edge.target);
                if counter.satisfy(edge.target, target.input_arity()) {
                    info!("Node '{}' is ready for execution", target.id());
                    ready.push_back(edge.target);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn execute_node(
        &self,
        pump: &mut Pump,
        handle: NodeHandle,
        state: &mut RunState,
    ) -> Result<()> {
        let invocation = Invocation::for_node(pump.node(handle), &self.workdir);
        info!("Executing node '{}'...", invocation.node);

        pump.set_status(handle, NodeStatus::Running);
        let result = self.runner.execute(&invocation).await;
        self.record(pump, handle, result, state)
    }

    /// Store a node's outcome on the graph
    fn record(
        &self,
        pump: &mut Pump,
        handle: NodeHandle,
        result: Result<ExecutionResult>,
        state: &mut RunState,
    ) -> Result<()> {
        let node = pump.node(handle).id().to_string();

        match result {
            Ok(outcome) if outcome.status == NodeStatus::Success => {
                if let Some(stdout) = outcome.stdout.as_deref().filter(|s| !s.is_empty()) {
                    debug!("Node '{}' stdout: {}", node, stdout.trim_end());
                }
                info!("Node '{}' finished in {:?}", node, outcome.duration);
                pump.set_status(handle, NodeStatus::Success);
                state.executed.push(node);
                Ok(())
            }
            Ok(outcome) => {
                error!(
                    "Node '{}' failed with exit code {:?}: {}",
                    node,
                    outcome.exit_code,
                    outcome.stderr.as_deref().unwrap_or_default().trim_end()
                );
                pump.set_status(handle, NodeStatus::Failed);
                Err(PumpError::NodeFailed {
                    node,
                    exit_code: outcome.exit_code,
                })
            }
            Err(e) => {
                error!("Node '{}' execution error: {}", node, e);
                pump.set_status(handle, NodeStatus::Failed);
                Err(e)
            }
        }
    }

    /// Move (or copy) the file behind an edge's source port into its target port
    async fn route_edge(&self, pump: &Pump, edge: &Edge, mode: RouteMode) -> Result<()> {
        let source = pump.node(edge.source);
        let target = pump.node(edge.target);

        let output = source
            .output(edge.source_port)
            .ok_or_else(|| PumpError::PortOutOfRange {
                node: source.id().to_string(),
                direction: Direction::Output,
                port: edge.source_port,
                arity: source.output_arity(),
            })?;
        let input = target
            .input(edge.target_port)
            .ok_or_else(|| PumpError::PortOutOfRange {
                node: target.id().to_string(),
                direction: Direction::Input,
                port: edge.target_port,
                arity: target.input_arity(),
            })?;

        let from = self.workdir.join(output);
        let to = self.workdir.join(input);
        info!("Routing '{}' -> '{}'", output, input);

        route_file(source.id(), &from, &to, mode).await
    }
}

/// Routing mode per edge: the last edge reading an output port moves the
/// file, earlier ones copy it.
fn route_modes(edges: &[Edge]) -> Vec<RouteMode> {
    let mut seen = HashSet::new();
    let mut modes: Vec<RouteMode> = edges
        .iter()
        .rev()
        .map(|edge| {
            if seen.insert((edge.source, edge.source_port)) {
                RouteMode::Move
            } else {
                RouteMode::Copy
            }
        })
        .collect();
    modes.reverse();
    modes
}

/// After an abort: interrupted nodes failed, never-started ones are skipped
fn abandon_remaining(pump: &mut Pump) {
    let pending: Vec<(NodeHandle, NodeStatus)> = pump
        .handles()
        .filter_map(|handle| match pump.node(handle).status() {
            NodeStatus::Pending => Some((handle, NodeStatus::Skipped)),
            NodeStatus::Running => Some((handle, NodeStatus::Failed)),
            _ => None,
        })
        .collect();

    for (handle, status) in pending {
        pump.set_status(handle, status);
    }
}
