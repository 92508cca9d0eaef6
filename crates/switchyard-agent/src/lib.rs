pub mod graph;
pub mod router;
pub mod session;
pub mod worker;

pub use graph::{ExecutionResult, GraphExecutor, NodeId};
pub use router::{normalize_choice, RouteDecision, Router};
pub use session::SessionRunner;
pub use worker::{NodeOutput, WorkerAdapter, WorkerRegistry};
