use tonic_build::manual::{Builder, Method, Service};

fn main() {
    // The single message is hand-written with prost derives, so the service
    // stubs are generated without invoking protoc.
    let call = Method::builder()
        .name("call")
        .route_name("Call")
        .input_type("crate::proto::Payload")
        .output_type("crate::proto::Payload")
        .codec_path("tonic::codec::ProstCodec")
        .build();

    let tasks = Service::builder()
        .name("Tasks")
        .package("shadowworkflow")
        .method(call)
        .build();

    Builder::new().compile(&[tasks]);

    println!("cargo:rerun-if-changed=build.rs");
}
