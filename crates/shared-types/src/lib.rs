//! # Shared Types Crate
//!
//! Cross-subsystem types for the Stratus edge node.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary is
//!   defined here.
//! - **Immutable configuration**: [`NodeConfig`] is built exactly once at
//!   process start and passed by reference into subsystems; no component
//!   reads the environment on its own.
//! - **Explicit request shape**: the gateway builds one [`RetrievalRequest`]
//!   per inbound request and passes it immutably through the pipeline.

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod identifier;
pub mod request;

pub use collaborators::*;
pub use config::*;
pub use errors::*;
pub use identifier::ContentId;
pub use request::*;
