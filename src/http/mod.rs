//! HTTP and gRPC clients for endpoint checks

mod client;
mod grpc;

pub use client::{HttpClient, HttpError, HttpRequest, HttpResponse};
pub use grpc::{GrpcRequest, GrpcResponse};
