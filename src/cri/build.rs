//! Build script for podshim-cri
//!
//! Generates the CRI ImageService and RuntimeService stubs. Message types are
//! hand-written prost structs in `src/cri_api.rs`, so no protoc is required.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic::codec::ProstCodec";

fn unary(name: &str, route: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::cri_api::{}Request", route))
        .output_type(format!("crate::cri_api::{}Response", route))
        .codec_path(CODEC)
        .build()
}

fn main() {
    let image_service = Service::builder()
        .name("ImageService")
        .package("runtime.v1")
        .method(unary("pull_image", "PullImage"))
        .method(unary("image_status", "ImageStatus"))
        .method(unary("remove_image", "RemoveImage"))
        .build();

    let runtime_service = Service::builder()
        .name("RuntimeService")
        .package("runtime.v1")
        .method(unary("version", "Version"))
        .method(unary("create_container", "CreateContainer"))
        .method(unary("start_container", "StartContainer"))
        .method(unary("stop_container", "StopContainer"))
        .method(unary("remove_container", "RemoveContainer"))
        .method(unary("container_status", "ContainerStatus"))
        .build();

    Builder::new()
        .build_server(true)
        .build_client(true)
        .compile(&[image_service, runtime_service]);

    println!("cargo:rerun-if-changed=build.rs");
}
