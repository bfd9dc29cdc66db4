//! Server module for building HTTP servers from resource modules
//!
//! [`ServerBuilder`] wires collaborators into an [`AppContext`], builds each
//! resource module against it, and mounts them all on one Router together
//! with health checks.

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::ServerBuilder;
pub use host::{AppContext, Dependency};
