//! Cluster object model.
//!
//! Only the fields the orchestrator reads or writes are typed; everything else a real
//! control plane returns is kept in the flattened `extra` maps so objects survive a
//! read-modify-write round trip unchanged.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const POD_PHASE_PENDING: &str = "Pending";
pub const POD_PHASE_RUNNING: &str = "Running";
pub const POD_PHASE_FAILED: &str = "Failed";

pub const DEFAULT_TRANSPORT: &str = "TCP";

/// Kinds of namespaced objects managed for a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Pod,
    Service,
    Route,
    PersistentVolumeClaim,
}

impl ResourceKind {
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::Route => "route.openshift.io/v1",
            _ => "v1",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Service => "Service",
            ResourceKind::Route => "Route",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
        }
    }

    /// Collection name used in REST paths.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pods",
            ResourceKind::Service => "services",
            ResourceKind::Route => "routes",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaims",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Common behaviour of every typed cluster object.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn type_meta_mut(&mut self) -> &mut TypeMeta;
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Fill `apiVersion`/`kind` so the object can be submitted as is.
    fn with_type_meta(mut self) -> Self {
        let types = self.type_meta_mut();
        types.api_version = Some(Self::KIND.api_version().to_string());
        types.kind = Some(Self::KIND.kind().to_string());
        self
    }
}

macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl Resource for $ty {
            const KIND: ResourceKind = $kind;

            fn type_meta_mut(&mut self) -> &mut TypeMeta {
                &mut self.types
            }

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Port reference that is either a number or a named port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i32),
    String(String),
}

// --- Pods -----------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(flatten)]
    pub types: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

impl_resource!(Pod, ResourceKind::Pod);

impl Pod {
    pub fn new(name: impl Into<String>, containers: Vec<Container>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: PodSpec {
                containers,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Some(POD_PHASE_RUNNING)
    }

    pub fn is_failed(&self) -> bool {
        self.phase() == Some(POD_PHASE_FAILED)
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.containers.iter().find(|c| c.name == name)
    }

    pub fn container_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.spec.containers.iter_mut().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub container_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl ContainerPort {
    pub fn new(port: i32, protocol: impl Into<String>) -> Self {
        Self {
            name: None,
            container_port: port,
            protocol: Some(protocol.into()),
        }
    }

    /// Transport protocol; the control plane treats a missing value as TCP.
    pub fn protocol(&self) -> &str {
        self.protocol.as_deref().unwrap_or(DEFAULT_TRANSPORT)
    }
}

// --- Services -------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(flatten)]
    pub types: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

impl_resource!(Service, ResourceKind::Service);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<IntOrString>,
}

impl ServicePort {
    pub fn protocol(&self) -> &str {
        self.protocol.as_deref().unwrap_or(DEFAULT_TRANSPORT)
    }
}

// --- Routes ---------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(flatten)]
    pub types: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RouteSpec,
}

impl_resource!(Route, ResourceKind::Route);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default)]
    pub to: RouteTargetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    #[serde(default = "default_route_target_kind")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

impl Default for RouteTargetReference {
    fn default() -> Self {
        Self {
            kind: default_route_target_kind(),
            name: String::new(),
        }
    }
}

fn default_route_target_kind() -> String {
    "Service".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: IntOrString,
}

// --- Volume claims --------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    #[serde(flatten)]
    pub types: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
}

impl_resource!(PersistentVolumeClaim, ResourceKind::PersistentVolumeClaim);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pod_keeps_unknown_fields() {
        let raw = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "main", "labels": {"app": "ws"}, "generation": 3},
            "spec": {
                "restartPolicy": "Never",
                "containers": [{
                    "name": "dev",
                    "image": "eclipse/ubuntu_jdk8",
                    "ports": [{"containerPort": 8080}],
                    "env": [{"name": "A", "value": "B"}]
                }]
            },
            "status": {"phase": "Running", "podIP": "10.0.0.4"}
        });

        let pod: Pod = serde_json::from_value(raw.clone()).unwrap();
        assert!(pod.is_running());
        assert_eq!(pod.spec.containers[0].ports[0].protocol(), "TCP");
        assert_eq!(serde_json::to_value(&pod).unwrap(), raw);
    }

    #[test]
    fn test_service_target_port_accepts_int_and_string() {
        let service: Service = serde_json::from_value(json!({
            "metadata": {"name": "svc"},
            "spec": {"ports": [
                {"name": "a", "port": 80, "targetPort": 8080},
                {"name": "b", "port": 81, "targetPort": "http"}
            ]}
        }))
        .unwrap();

        assert_eq!(service.spec.ports[0].target_port, Some(IntOrString::Int(8080)));
        assert_eq!(
            service.spec.ports[1].target_port,
            Some(IntOrString::String("http".to_string()))
        );
    }

    #[test]
    fn test_with_type_meta_fills_route_group() {
        let route = Route::default().with_type_meta();
        assert_eq!(route.types.api_version.as_deref(), Some("route.openshift.io/v1"));
        assert_eq!(route.types.kind.as_deref(), Some("Route"));
    }

    #[test]
    fn test_route_target_kind_defaults_to_service() {
        let route: Route =
            serde_json::from_value(json!({"metadata": {"name": "r"}, "spec": {"to": {"name": "svc"}}}))
                .unwrap();
        assert_eq!(route.spec.to.kind, "Service");
        assert_eq!(route.spec.to.name, "svc");
    }
}
