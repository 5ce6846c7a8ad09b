//! Materialises a machine's declared servers into container ports, one Service and
//! per-port Routes inside the environment.

use super::annotations::{self, Servers};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;
use ws_core::error::{InfraError, Result};
use ws_model::environment::{Environment, PortSpec};
use ws_model::labels::{MACHINE_NAME_ANNOTATION, ORIGINAL_NAME_LABEL};
use ws_model::objects::{
    ContainerPort, IntOrString, ObjectMeta, Route, RoutePort, RouteSpec, RouteTargetReference,
    Service, ServicePort, DEFAULT_TRANSPORT,
};

pub const SERVER_PREFIX: &str = "server";
const SERVICE_SUFFIX_LENGTH: usize = 8;

/// Service port name for a `(port, transport)` pair; also the suffix of its Route.
pub fn service_port_name(spec: &PortSpec) -> String {
    if spec.transport == DEFAULT_TRANSPORT {
        format!("{}-{}", SERVER_PREFIX, spec.port)
    } else {
        format!(
            "{}-{}-{}",
            SERVER_PREFIX,
            spec.port,
            spec.transport.to_lowercase()
        )
    }
}

pub fn route_name(service_name: &str, port_name: &str) -> String {
    format!("{}-{}", service_name, port_name)
}

fn generate_service_name(machine_name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SERVICE_SUFFIX_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("{}{}-{}", SERVER_PREFIX, suffix, machine_name.replace('/', "-"))
}

pub struct ServerExposer<'a> {
    machine_name: &'a str,
    pod_name: &'a str,
    container_name: &'a str,
    env: &'a mut Environment,
}

impl<'a> ServerExposer<'a> {
    pub fn new(
        machine_name: &'a str,
        pod_name: &'a str,
        container_name: &'a str,
        env: &'a mut Environment,
    ) -> Self {
        Self {
            machine_name,
            pod_name,
            container_name,
            env,
        }
    }

    /// Expose `servers`. Repeated calls with the same servers change nothing.
    pub fn expose(&mut self, servers: &Servers) -> Result<()> {
        let mut by_port: BTreeMap<PortSpec, Servers> = BTreeMap::new();
        for (name, config) in servers {
            by_port
                .entry(config.port_spec()?)
                .or_default()
                .insert(name.clone(), config.clone());
        }
        if by_port.is_empty() {
            return Ok(());
        }

        self.declare_container_ports(by_port.keys())?;
        let service_name = self.expose_service(&by_port)?;

        for (spec, group) in &by_port {
            let external: Servers = group
                .iter()
                .filter(|(_, c)| c.external)
                .map(|(n, c)| (n.clone(), c.clone()))
                .collect();
            if !external.is_empty() {
                self.expose_route(&service_name, spec, &external)?;
            }
        }
        Ok(())
    }

    fn declare_container_ports<'s>(
        &mut self,
        specs: impl Iterator<Item = &'s PortSpec>,
    ) -> Result<()> {
        let container = self
            .env
            .pods
            .get_mut(self.pod_name)
            .and_then(|pod| pod.container_mut(self.container_name))
            .ok_or_else(|| {
                InfraError::Internal(format!(
                    "Container '{}' of pod '{}' is not declared",
                    self.container_name, self.pod_name
                ))
            })?;

        for spec in specs {
            let declared = container
                .ports
                .iter()
                .any(|p| p.container_port == spec.port && p.protocol() == spec.transport);
            if !declared {
                container
                    .ports
                    .push(ContainerPort::new(spec.port, spec.transport.clone()));
            }
        }
        Ok(())
    }

    /// Add the ports to the machine's Service, creating it on first exposure.
    fn expose_service(&mut self, by_port: &BTreeMap<PortSpec, Servers>) -> Result<String> {
        let existing = self
            .env
            .services
            .iter()
            .find(|(_, s)| {
                s.metadata.annotations.get(MACHINE_NAME_ANNOTATION).map(String::as_str)
                    == Some(self.machine_name)
            })
            .map(|(key, _)| key.clone());

        let key = match existing {
            Some(key) => key,
            None => {
                let name = generate_service_name(self.machine_name);
                let mut metadata = ObjectMeta::named(name.clone());
                metadata.annotations.insert(
                    MACHINE_NAME_ANNOTATION.to_string(),
                    self.machine_name.to_string(),
                );
                let mut service = Service {
                    metadata,
                    ..Default::default()
                };
                service
                    .spec
                    .selector
                    .insert(ORIGINAL_NAME_LABEL.to_string(), self.pod_name.to_string());
                self.env.services.insert(name.clone(), service);
                name
            }
        };

        let service = self
            .env
            .services
            .get_mut(&key)
            .ok_or_else(|| InfraError::Internal(format!("Service '{}' vanished", key)))?;

        for (spec, group) in by_port {
            let port_name = service_port_name(spec);
            if !service
                .spec
                .ports
                .iter()
                .any(|p| p.name.as_deref() == Some(port_name.as_str()))
            {
                service.spec.ports.push(ServicePort {
                    name: Some(port_name),
                    port: spec.port,
                    protocol: Some(spec.transport.clone()),
                    target_port: Some(IntOrString::Int(spec.port)),
                });
            }

            let internal: Servers = group
                .iter()
                .filter(|(_, c)| !c.external)
                .map(|(n, c)| (n.clone(), c.clone()))
                .collect();
            if !internal.is_empty() {
                annotations::annotate(&mut service.metadata, &internal)?;
            }
        }

        Ok(service.metadata.name.clone())
    }

    fn expose_route(&mut self, service_name: &str, spec: &PortSpec, servers: &Servers) -> Result<()> {
        let port_name = service_port_name(spec);
        let name = route_name(service_name, &port_name);

        let route = self.env.routes.entry(name.clone()).or_insert_with(|| Route {
            metadata: ObjectMeta::named(name),
            spec: RouteSpec {
                to: RouteTargetReference {
                    name: service_name.to_string(),
                    ..Default::default()
                },
                port: Some(RoutePort {
                    target_port: IntOrString::String(port_name),
                }),
                ..Default::default()
            },
            ..Default::default()
        });
        annotations::annotate(&mut route.metadata, servers)
    }
}
