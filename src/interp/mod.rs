//! The interpreter: state, control flow, expansion hooks, and the executor.

pub mod arith;
pub mod cond;
pub mod engine;
pub mod flow;
pub mod host;
pub mod redirect;
pub mod state;
pub mod vars;

pub use engine::Executor;
pub use flow::{ControlFlow, ExecOutcome, ExecResult, Output};
pub use host::HostBridge;
pub use state::{ExecutionLimits, ShellState};
