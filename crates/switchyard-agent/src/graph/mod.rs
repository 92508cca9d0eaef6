//! Supervisor graph: a router node, one node per registered worker, and an
//! absorbing terminal state.
//!
//! The `GraphExecutor` starts every turn at the router. A router step picks a
//! worker or ends the turn; a worker step appends to the transcript and either
//! returns to the router or, for one-shot workers, ends the turn. A step
//! ceiling bounds the number of node executions per turn.

pub mod executor;

pub use executor::{ExecutionResult, GraphExecutor, NodeId};
