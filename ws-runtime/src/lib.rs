//! Workspace runtime orchestration
//!
//! Turns an environment description into running machines on a cluster project:
//! servers are exposed through Services and Routes, pods are started and watched,
//! installers run through exec, and readiness is tracked per server. Everything a
//! runtime creates is removed again on stop or on a failed start.

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod events;
pub mod infrastructure;
pub mod machine;
pub mod provision;
pub mod readiness;
pub mod runtime;
pub mod server;

pub use bootstrap::{Bootstrapper, ExecBootstrapper};
pub use config::RuntimeConfig;
pub use context::RuntimeContext;
pub use events::{ChannelEventSink, EventSink, LoggingEventSink};
pub use infrastructure::{OpenShiftInfrastructure, RuntimeInfrastructure};
pub use machine::ClusterMachine;
pub use readiness::{HttpServersChecker, ReadinessChecker};
pub use runtime::{Collaborators, InternalRuntime, OpenShiftRuntime, START_INTERRUPTED};
