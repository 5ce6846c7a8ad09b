//! Well-known labels and annotations stamped on cluster objects.

/// Label carrying the workspace id; the selector for every object of one runtime.
pub const WORKSPACE_ID_LABEL: &str = "workspace.runtime/workspace-id";

/// Label carrying the pod name declared in the environment.
pub const ORIGINAL_NAME_LABEL: &str = "workspace.runtime/original-name";

/// Annotation naming the machine a Service or Route was created for.
pub const MACHINE_NAME_ANNOTATION: &str = "workspace.runtime/machine-name";

/// Annotation holding the JSON-encoded servers exposed through a Service or Route.
pub const SERVERS_ANNOTATION: &str = "workspace.runtime/servers";
