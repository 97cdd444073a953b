//! podshim Core - engine interface and shared types
//!
//! Defines the collaborator interface every container engine backend
//! implements, the error taxonomy surfaced through the CRI services, and
//! server configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod idmap;

// Re-export commonly used types
pub use config::{ContainerDefaults, EngineConfig, EngineKind, ServerConfig};
pub use engine::{
    ContainerDescriptor, ContainerEngine, ContainerRef, ContainerState, EngineVersion,
    ImageDetails, PulledImage,
};
pub use error::{Result, ShimError};
pub use idmap::{IdMap, IdMappingOptions, IdMappingSet};

/// podshim version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
