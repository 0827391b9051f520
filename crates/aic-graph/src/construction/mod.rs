//! Construction Phase
//!
//! All structural validation happens here, producing a sealed
//! [`crate::Topology`].
//!
//! # Two-Phase Architecture
//!
//! 1. **Construction Phase** (this module):
//!    - Add resources through component scopes
//!    - Infer dependency edges from embedded tokens
//!    - Record explicit dependency edges, rejecting cycles
//!    - Register outputs and image assets
//!    - Produce `Topology`
//!
//! 2. **Execution Phase** (executor module):
//!    - Publish image assets
//!    - Resolve tokens against provisioned state
//!    - Create, update or reuse each resource in dependency order

pub mod builder;
pub mod handle;
pub mod validator;

pub use builder::TopologyBuilder;
pub use handle::{ResourceHandle, Scope};
pub use validator::TopologyValidator;
