//! Tether Host - runs the loader against the local filesystem

pub mod dir;
pub mod preload;

pub use dir::DirTransport;
pub use preload::{dir_loader, init_tracing, preload, read_config};
