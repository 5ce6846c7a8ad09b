//! Server exposure: turning declared servers into Services and Routes, and reading
//! the resulting URLs back.

pub mod annotations;
pub mod exposer;
pub mod resolver;

pub use annotations::Servers;
pub use exposer::ServerExposer;
pub use resolver::ServerResolver;
