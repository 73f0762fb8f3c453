pub mod config;
pub mod error;
pub mod grpc;
pub mod node;
pub mod notify;
pub mod registry;
pub mod report;
pub mod shutdown;
pub mod store;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("rpc");
}
