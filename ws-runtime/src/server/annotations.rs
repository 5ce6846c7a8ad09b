//! Server metadata carried on Services and Routes.

use indexmap::IndexMap;
use tracing::warn;
use ws_core::error::Result;
use ws_model::environment::ServerConfig;
use ws_model::labels::SERVERS_ANNOTATION;
use ws_model::objects::ObjectMeta;

pub type Servers = IndexMap<String, ServerConfig>;

pub fn serialize(servers: &Servers) -> Result<String> {
    Ok(serde_json::to_string(servers)?)
}

pub fn deserialize(value: &str) -> Result<Servers> {
    Ok(serde_json::from_str(value)?)
}

/// Servers annotated on an object; an unreadable annotation counts as none.
pub fn servers_of(metadata: &ObjectMeta) -> Servers {
    match metadata.annotations.get(SERVERS_ANNOTATION) {
        Some(value) => deserialize(value).unwrap_or_else(|e| {
            warn!(object = %metadata.name, error = %e, "Ignoring malformed servers annotation");
            Servers::new()
        }),
        None => Servers::new(),
    }
}

/// Merge `servers` into the object's annotation.
pub fn annotate(metadata: &mut ObjectMeta, servers: &Servers) -> Result<()> {
    let mut merged = servers_of(metadata);
    for (name, config) in servers {
        merged.insert(name.clone(), config.clone());
    }
    metadata
        .annotations
        .insert(SERVERS_ANNOTATION.to_string(), serialize(&merged)?);
    Ok(())
}
