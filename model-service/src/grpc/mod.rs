//! gRPC transport of the model service, beside the REST router.

pub mod convert;
pub mod server;

#[allow(clippy::all)]
pub mod generated {
    include!(concat!(env!("OUT_DIR"), "/instill.model.v1alpha.rs"));
}

pub use server::ModelGrpcServer;
