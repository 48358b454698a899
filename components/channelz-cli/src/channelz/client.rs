//! Protocol client adapter
//!
//! Thin typed wrapper around the generated `ChannelzClient`. Every RPC races the
//! command's cancellation token, so an expired command budget surfaces as
//! [`ChannelzError::Cancelled`] on whichever call is in flight.

// Local crates
use crate::models::models::{Channel, Page, Reference, Server, Socket, Subchannel};
use crate::proto::channelz::{
    GetServerSocketsRequest, GetServersRequest, GetSocketRequest, GetSubchannelRequest,
    GetTopChannelsRequest, channelz_client::ChannelzClient,
};

// External crates
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, transport::Channel as TransportChannel};
use tracing::instrument;

/// Errors raised by the channelz client and everything built on it.
#[derive(Debug, thiserror::Error)]
pub enum ChannelzError {
    #[error("rpc {rpc} failed: {status}")]
    Rpc {
        rpc: &'static str,
        #[source]
        status: tonic::Status,
    },
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("invalid server address {0:?}")]
    InvalidAddress(String),
    #[error("no server address given, use --addr or [connection] addr")]
    MissingAddress,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{rpc} returned an empty response")]
    EmptyResponse { rpc: &'static str },
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The RPC surface the traversal, resolver and tree assembler depend on.
///
/// Listing calls take the per-attempt timeout chosen by the traversal policy, `None`
/// meaning "bounded only by the command budget".
#[async_trait]
pub trait ChannelzApi: Send + Sync {
    /// One page of top-level channels with `id >= start_channel_id`.
    async fn top_channels(
        &self,
        start_channel_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Page<Channel>, ChannelzError>;

    /// One page of servers with `id >= start_server_id`.
    async fn servers(
        &self,
        start_server_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Page<Server>, ChannelzError>;

    /// One page of socket references owned by `server_id`.
    async fn server_sockets(
        &self,
        server_id: i64,
        start_socket_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Page<Reference>, ChannelzError>;

    /// Fetch a subchannel by id. Any failure, including NOT_FOUND, is an error.
    async fn subchannel(&self, subchannel_id: i64) -> Result<Subchannel, ChannelzError>;

    /// Fetch a socket by id. NOT_FOUND is `Ok(None)`.
    async fn socket(&self, socket_id: i64) -> Result<Option<Socket>, ChannelzError>;
}

/// [`ChannelzApi`] backed by a live tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcChannelz {
    client: ChannelzClient<TransportChannel>,
    cancel: CancellationToken,
}

impl GrpcChannelz {
    pub fn new(channel: TransportChannel, cancel: CancellationToken) -> Self {
        Self {
            client: ChannelzClient::new(channel),
            cancel,
        }
    }

    /// Run one RPC future against the command cancellation token and an optional
    /// per-call timeout.
    async fn call<T, F>(
        &self,
        rpc: &'static str,
        timeout: Option<Duration>,
        fut: F,
    ) -> Result<T, ChannelzError>
    where
        F: std::future::Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    {
        let fut = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| ChannelzError::Timeout(limit))?,
                None => fut.await,
            }
            .map(tonic::Response::into_inner)
            .map_err(|status| ChannelzError::Rpc { rpc, status })
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(rpc, "Command cancelled while rpc was in flight");
                Err(ChannelzError::Cancelled)
            }
            res = fut => res,
        }
    }
}

fn request<T>(message: T, timeout: Option<Duration>) -> Request<T> {
    let mut request = Request::new(message);
    if let Some(limit) = timeout {
        request.set_timeout(limit);
    }
    request
}

#[async_trait]
impl ChannelzApi for GrpcChannelz {
    #[instrument(name = "channelz_client::top_channels", skip(self), level = "debug")]
    async fn top_channels(
        &self,
        start_channel_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Page<Channel>, ChannelzError> {
        let mut client = self.client.clone();
        let req = request(
            GetTopChannelsRequest {
                start_channel_id,
                max_results: 0,
            },
            timeout,
        );
        let res = self
            .call("GetTopChannels", timeout, client.get_top_channels(req))
            .await?;

        tracing::debug!(
            channels = res.channel.len(),
            end = res.end,
            "Received top channels page"
        );
        Ok(Page {
            items: res.channel.into_iter().map(Channel::from).collect(),
            end: res.end,
        })
    }

    #[instrument(name = "channelz_client::servers", skip(self), level = "debug")]
    async fn servers(
        &self,
        start_server_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Page<Server>, ChannelzError> {
        let mut client = self.client.clone();
        let req = request(
            GetServersRequest {
                start_server_id,
                max_results: 0,
            },
            timeout,
        );
        let res = self
            .call("GetServers", timeout, client.get_servers(req))
            .await?;

        tracing::debug!(
            servers = res.server.len(),
            end = res.end,
            "Received servers page"
        );
        Ok(Page {
            items: res.server.into_iter().map(Server::from).collect(),
            end: res.end,
        })
    }

    #[instrument(name = "channelz_client::server_sockets", skip(self), level = "debug")]
    async fn server_sockets(
        &self,
        server_id: i64,
        start_socket_id: i64,
        timeout: Option<Duration>,
    ) -> Result<Page<Reference>, ChannelzError> {
        let mut client = self.client.clone();
        let req = request(
            GetServerSocketsRequest {
                server_id,
                start_socket_id,
                max_results: 0,
            },
            timeout,
        );
        let res = self
            .call("GetServerSockets", timeout, client.get_server_sockets(req))
            .await?;

        tracing::debug!(
            sockets = res.socket_ref.len(),
            end = res.end,
            "Received server sockets page"
        );
        Ok(Page {
            items: res.socket_ref.into_iter().map(Reference::from).collect(),
            end: res.end,
        })
    }

    #[instrument(name = "channelz_client::subchannel", skip(self), level = "debug")]
    async fn subchannel(&self, subchannel_id: i64) -> Result<Subchannel, ChannelzError> {
        let mut client = self.client.clone();
        let req = request(GetSubchannelRequest { subchannel_id }, None);
        let res = self
            .call("GetSubchannel", None, client.get_subchannel(req))
            .await?;

        res.subchannel
            .map(Channel::from)
            .ok_or(ChannelzError::EmptyResponse {
                rpc: "GetSubchannel",
            })
    }

    #[instrument(name = "channelz_client::socket", skip(self), level = "debug")]
    async fn socket(&self, socket_id: i64) -> Result<Option<Socket>, ChannelzError> {
        let mut client = self.client.clone();
        let req = request(
            GetSocketRequest {
                socket_id,
                summary: false,
            },
            None,
        );
        match self.call("GetSocket", None, client.get_socket(req)).await {
            Ok(res) => Ok(res.socket.map(Socket::from)),
            Err(ChannelzError::Rpc { status, .. }) if status.code() == Code::NotFound => {
                tracing::debug!(socket_id, "Socket not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
