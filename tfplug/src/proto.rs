//! Generated protocol types.
//!
//! `tfplugin6` holds the Terraform Plugin Protocol messages, `plugin` the
//! go-plugin controller service and `health` the gRPC health check consulted
//! by go-plugin. Framework types share names with some protocol messages
//! (`DynamicValue`, `Diagnostic`, `Schema`); keep the `proto::` prefix when
//! referring to the wire types.

pub mod tfplugin6 {
    tonic::include_proto!("tfplugin6");
}

pub mod plugin {
    tonic::include_proto!("plugin");
}

pub mod health {
    tonic::include_proto!("grpc.health.v1");
}

pub use tfplugin6::*;

pub use tfplugin6::provider_server::ProviderServer;
