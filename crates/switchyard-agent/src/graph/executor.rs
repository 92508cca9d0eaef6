use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use switchyard_core::config::GraphConfig;
use switchyard_core::error::Result;
use switchyard_core::event::EventBus;
use switchyard_core::traits::CheckpointStore;
use switchyard_core::types::{
    ConversationState, GraphEvent, Message, NextNode, Termination, ROUTER,
};

use crate::router::Router;
use crate::worker::WorkerRegistry;

/// A state of the supervisor graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeId {
    Router,
    Worker(String),
    Terminal,
}

impl NodeId {
    fn from_next(next: &NextNode) -> Self {
        match next {
            NextNode::Router => Self::Router,
            NextNode::Worker(name) => Self::Worker(name.clone()),
            NextNode::Finish => Self::Terminal,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Router => ROUTER,
            Self::Worker(name) => name,
            Self::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of running one turn through the graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub state: ConversationState,
    /// Nodes in visit order, ending with `NodeId::Terminal`.
    pub path: Vec<NodeId>,
    /// Node executions performed.
    pub steps: usize,
    pub termination: Termination,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    /// Number of worker executions in this turn.
    pub fn worker_invocations(&self) -> usize {
        self.path
            .iter()
            .filter(|n| matches!(n, NodeId::Worker(_)))
            .count()
    }
}

/// Runs the router/worker loop for one turn.
pub struct GraphExecutor {
    router: Router,
    registry: WorkerRegistry,
    config: GraphConfig,
    store: Arc<dyn CheckpointStore>,
    event_bus: Option<Arc<EventBus>>,
}

impl GraphExecutor {
    pub fn new(
        router: Router,
        registry: WorkerRegistry,
        config: GraphConfig,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            router,
            registry,
            config,
            store,
            event_bus: None,
        }
    }

    /// Publish lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Drive `state` from the router to the terminal state.
    ///
    /// Routing and worker failures are absorbed into the transcript; only
    /// persistence errors are returned.
    pub async fn execute(&self, mut state: ConversationState) -> Result<ExecutionResult> {
        let start = Instant::now();
        let session_id = state.session_id().clone();
        let max_steps = self.config.max_steps;

        self.publish(GraphEvent::TurnStarted {
            session_id: session_id.clone(),
            turn: state.turn() + 1,
        });
        info!(session_id = %session_id, turn = state.turn() + 1, "Turn started");

        let mut current = NodeId::Router;
        let mut path = Vec::new();
        let mut steps = 0usize;
        let mut worker_output = false;
        let mut termination = Termination::Routed;
        let mut end_reason: Option<String> = None;

        while current != NodeId::Terminal {
            if steps >= max_steps {
                warn!(session_id = %session_id, max_steps, "Step ceiling reached");
                state.push(Message::system(format!(
                    "Turn stopped after reaching the step limit of {} before a final answer.",
                    max_steps
                )));
                state.set_next(NextNode::Finish);
                termination = Termination::StepCeiling;
                self.publish(GraphEvent::CeilingReached {
                    session_id: session_id.clone(),
                    max_steps,
                });
                break;
            }

            steps += 1;
            path.push(current.clone());
            let node_start = Instant::now();
            let before = state.len();

            self.publish(GraphEvent::NodeStarted {
                session_id: session_id.clone(),
                node: current.label().to_string(),
                step: steps,
            });

            let next = match &current {
                NodeId::Router => {
                    let decision = self.router.decide(&state, &self.registry).await;
                    info!(
                        session_id = %session_id,
                        step = steps,
                        next = %decision.next,
                        "Router decided"
                    );
                    self.publish(GraphEvent::RouteDecided {
                        session_id: session_id.clone(),
                        raw: decision.raw.trim().to_string(),
                        next: decision.next.clone(),
                    });

                    if decision.next.is_finish() {
                        termination = Termination::Routed;
                        end_reason = Some(match decision.failure {
                            Some(err) => format!("routing failed ({})", err),
                            None if decision.raw.trim().eq_ignore_ascii_case("finish") => {
                                "the router chose to finish".to_string()
                            }
                            None => format!(
                                "the router reply '{}' matched no worker",
                                decision.raw.trim()
                            ),
                        });
                    }
                    decision.next
                }
                NodeId::Worker(name) => {
                    let output = self.registry.dispatch(name, &state).await?;
                    worker_output |= !output.messages.is_empty();
                    state.extend(output.messages);
                    if output.next.is_finish() {
                        termination = Termination::OneShot;
                    }
                    output.next
                }
                NodeId::Terminal => NextNode::Finish,
            };

            state.set_next(next.clone());
            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            let appended = state.len() - before;

            debug!(
                session_id = %session_id,
                node = %current,
                step = steps,
                appended,
                elapsed_ms,
                "Node execution complete"
            );
            self.publish(GraphEvent::NodeFinished {
                session_id: session_id.clone(),
                node: current.label().to_string(),
                step: steps,
                appended,
                elapsed_ms,
            });

            current = NodeId::from_next(&next);

            if self.config.checkpoint_every_step && current != NodeId::Terminal {
                self.store.save(&state).await?;
            }
        }

        if termination != Termination::StepCeiling && !worker_output {
            let reason = end_reason.unwrap_or_else(|| "no worker was selected".to_string());
            state.push(Message::system(format!(
                "Turn ended without a worker response: {}.",
                reason
            )));
        }

        path.push(NodeId::Terminal);
        state.complete_turn();
        self.store.save(&state).await?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            session_id = %session_id,
            steps,
            termination = ?termination,
            elapsed_ms,
            "Turn complete"
        );
        self.publish(GraphEvent::TurnComplete {
            session_id,
            steps,
            termination,
        });

        Ok(ExecutionResult {
            state,
            path,
            steps,
            termination,
            elapsed_ms,
        })
    }
}
