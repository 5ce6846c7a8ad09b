//! Foundation types for the workspace runtime.
//!
//! Every other crate in the workspace reports failures through [`error::InfraError`]
//! and initialises logging through [`tracing_init`].

pub mod error;
pub mod tracing_init;

pub use error::{InfraError, Result};
