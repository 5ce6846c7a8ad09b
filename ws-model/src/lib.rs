//! Data model shared by the cluster clients and the runtime orchestrator.
//!
//! - [`objects`]: typed cluster objects (pods, services, routes, volume claims)
//! - [`environment`]: the declarative environment a runtime is started from
//! - [`runtime`]: runtime identity and machine/server snapshots
//! - [`events`]: lifecycle events emitted to the event sink

pub mod environment;
pub mod events;
pub mod labels;
pub mod objects;
pub mod runtime;

pub use environment::{Environment, InstallerConfig, MachineConfig, PortSpec, ServerConfig};
pub use events::{MachineStatusEvent, RuntimeEvent, RuntimeStatusEvent, ServerStatusEvent};
pub use objects::{
    Container, ContainerPort, IntOrString, ObjectMeta, PersistentVolumeClaim, Pod, Resource,
    ResourceKind, Route, RoutePort, RouteTargetReference, Service, ServicePort,
};
pub use runtime::{
    Machine, MachineStatus, RuntimeIdentity, RuntimeStatus, Server, ServerStatus,
};
