//! Runtime plumbing shared by the gateway: ambient correlation scopes, the
//! background-task registry, and the agent-runner contract.

pub mod correlator;
pub mod runner;
pub mod tasks;

pub use correlator::ContextualCorrelator;
pub use runner::{AgentRunner, AgentRunnerFactory, Context};
pub use tasks::{BackgroundTaskService, TaskHandle};
