//! Tool-call orchestration: incremental argument parsing, response assembly
//! and the chained-call conversation loop.

pub mod assembler;
pub mod orchestrator;
pub mod partial_json;

pub use assembler::{AssembledResponse, Assembler, AssemblerState, CapabilityCall};
pub use orchestrator::{DEFAULT_MAX_DEPTH, Orchestrator, OrchestratorConfig, QueryEvent};
pub use partial_json::{Feed, PartialJson};
