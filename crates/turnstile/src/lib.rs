//! A terminal agent that answers with the help of MCP tool servers, skill
//! guides and retrieved reference material.
//!
//! The crate includes a CLI for using in the terminal. It can also be used
//! as a library: [`SessionBuilder`] wires the providers, skills and
//! retrieval into a [`core::Agent`].

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod config;
pub mod mcp;
pub mod rag;
mod session;
pub mod skills;
pub mod tools;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`turnstile_core`] crate.
pub mod core {
    pub use turnstile_core::*;
}
