//! podshim CRI - Kubernetes Container Runtime Interface shim.
//!
//! Serves the CRI ImageService and RuntimeService over gRPC and forwards
//! every call to a container engine:
//! - PullImage → ensure image present (pull if missing)
//! - CreateContainer → pull, inspect, build descriptor, engine create
//! - StartContainer / StopContainer → engine start / stop by container id

pub mod client;
pub mod container_config;
pub mod cri_api;
pub mod error;
pub mod image_service;
pub mod runtime_service;
pub mod server;
