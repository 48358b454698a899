#[allow(missing_docs, clippy::all)]
pub mod channelz {
    tonic::include_proto!("grpc.channelz.v1");
}
