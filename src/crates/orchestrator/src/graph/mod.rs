//! The generation graph and its orchestrator façade
//!
//! Static node wiring (`build`), the typed shared state (`state`), the
//! checkpointer factory (`checkpointer`), node bodies over collaborator
//! traits (`nodes`), and the one-call-per-request façade (`orchestrator`).

pub mod build;
pub mod checkpointer;
pub mod nodes;
pub mod orchestrator;
pub mod state;

pub use build::create_generation_graph;
pub use checkpointer::build_checkpointer;
pub use nodes::{AppDataStore, GenerationAgents, NodeContext, PageRenderer, PassthroughAgents};
pub use orchestrator::{OrchestratorResponse, SiteOrchestrator, StreamRequest};
pub use state::GraphState;
