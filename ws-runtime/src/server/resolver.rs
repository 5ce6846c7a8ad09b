use super::annotations;
use std::collections::BTreeMap;
use ws_model::environment::ServerConfig;
use ws_model::objects::{Container, IntOrString, Pod, Route, Service, ServicePort};
use ws_model::runtime::Server;

/// Reconstructs server URLs from the Services and Routes that exist in the cluster.
pub struct ServerResolver {
    services: Vec<Service>,
    routes: Vec<Route>,
}

impl ServerResolver {
    pub fn of(services: Vec<Service>, routes: Vec<Route>) -> Self {
        Self { services, routes }
    }

    /// Servers of one container, all in STARTING state.
    pub fn resolve(&self, pod: &Pod, container: &Container) -> BTreeMap<String, Server> {
        let mut servers = BTreeMap::new();

        for service in self.services.iter().filter(|s| selects(s, pod)) {
            let ports: Vec<&ServicePort> = service
                .spec
                .ports
                .iter()
                .filter(|p| targets(p, container))
                .collect();
            if ports.is_empty() {
                continue;
            }

            for route in self.routes.iter().filter(|r| r.spec.to.name == service.metadata.name) {
                let routed = match route.spec.port.as_ref().map(|p| &p.target_port) {
                    Some(IntOrString::String(name)) => {
                        ports.iter().any(|p| p.name.as_deref() == Some(name.as_str()))
                    }
                    Some(IntOrString::Int(number)) => ports.iter().any(|p| p.port == *number),
                    None => true,
                };
                if !routed {
                    continue;
                }

                let host = route.spec.host.as_deref().unwrap_or_default();
                for (name, config) in annotations::servers_of(&route.metadata) {
                    servers.insert(name, Server::starting(server_url(&config, host)));
                }
            }

            for (name, config) in annotations::servers_of(&service.metadata) {
                let Ok(spec) = config.port_spec() else {
                    continue;
                };
                if let Some(port) = ports
                    .iter()
                    .find(|p| p.port == spec.port && p.protocol() == spec.transport)
                {
                    let address = format!("{}:{}", service.metadata.name, port.port);
                    servers.insert(name, Server::starting(server_url(&config, &address)));
                }
            }
        }

        servers
    }
}

fn selects(service: &Service, pod: &Pod) -> bool {
    let selector = &service.spec.selector;
    !selector.is_empty()
        && selector
            .iter()
            .all(|(k, v)| pod.metadata.labels.get(k) == Some(v))
}

fn targets(port: &ServicePort, container: &Container) -> bool {
    match &port.target_port {
        Some(IntOrString::Int(number)) => container
            .ports
            .iter()
            .any(|p| p.container_port == *number && p.protocol() == port.protocol()),
        Some(IntOrString::String(name)) => container
            .ports
            .iter()
            .any(|p| p.name.as_deref() == Some(name.as_str())),
        None => container.ports.iter().any(|p| p.container_port == port.port),
    }
}

/// `<protocol>://<host><path>`, or `<host><path>` without a protocol.
pub fn server_url(config: &ServerConfig, host: &str) -> String {
    let path = match config.path.as_deref() {
        Some(p) if !p.is_empty() && !p.starts_with('/') => format!("/{}", p),
        Some(p) => p.to_string(),
        None => String::new(),
    };
    match config.protocol.as_deref() {
        Some(protocol) => format!("{}://{}{}", protocol, host, path),
        None => format!("{}{}", host, path),
    }
}
