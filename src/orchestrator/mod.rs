//! Orchestrator: asks a pool of agents to validate a domain and accepts the
//! result only when enough of them agree.
//!
//! ```text
//!               ┌─────────────┐
//!  request ───▶ │ select_pool │──▶ agent 1 ─┐
//!               └─────────────┘──▶ agent 2 ─┼─▶ mpsc ─▶ decide ─▶ result
//!                              └─▶ agent N ─┘
//! ```
//!
//! Every agent request runs in its own task under the dispatch timeout.

pub mod dispatch;
pub mod quorum;
pub mod registry;

pub use dispatch::{AgentClient, HttpAgentClient, Orchestrator};
pub use quorum::{decide, QuorumConfig, Tally, Verdict, DEFAULT_TIMEOUT_MILLIS};
pub use registry::{AgentDescriptor, AgentRegistry, DEFAULT_AGENT_PORT};
