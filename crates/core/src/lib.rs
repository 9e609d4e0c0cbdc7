//! Core logic including the tool-calling loop, stream assembly, tool
//! dispatch and input augmentation.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod assembler;
pub mod augment;
pub mod conversation;
mod error;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, DEFAULT_MAX_ITERATIONS, LoopStage, TranscriptSource,
    TurnOutcome,
};
pub use error::Error;
