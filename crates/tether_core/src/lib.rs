//! Tether Core - dependency-graph module loading
//!
//! Identifiers go through the [`resolver`] to canonical locations, the
//! [`loader`] walks the graph they form, a [`transport`] fetches what is
//! missing, and every module's factory runs at most once.

pub mod config;
pub mod define;
pub mod entry;
pub mod error;
mod fetch;
pub mod graph;
pub mod hooks;
pub mod loader;
pub mod parser;
pub mod path;
pub mod resolver;
pub mod transport;

pub use config::{ConfigUpdate, CorsMode, LoaderConfig, MapRule};
pub use define::{Definition, Factory};
pub use entry::EntryId;
pub use error::{FetchError, LoaderError, Result};
pub use graph::{Module, ModuleId, Registry, Status};
pub use hooks::Hook;
pub use loader::{Loader, Scope};
pub use parser::{extract_dependencies, DependencyExtractor, SourceScanner};
pub use resolver::Resolver;
pub use transport::{
    channel, Completion, FetchRequest, MemoryTransport, Payload, RequestLog, Transport,
};
