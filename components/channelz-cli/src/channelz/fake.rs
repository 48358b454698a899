//! In-memory channelz service used by unit tests.
//!
//! Listings apply the server's id-threshold filter (`id >= start`) and return at most
//! `page_size` items, with `end` set once nothing is left past the page.

// Local crates
use crate::channelz::client::{ChannelzApi, ChannelzError};
use crate::models::models::{Channel, Identified, Page, Reference, Server, Socket, Subchannel};

// External crates
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FakeChannelz {
    top_channels: Vec<Channel>,
    servers: Vec<Server>,
    server_sockets: HashMap<i64, Vec<Reference>>,
    subchannels: HashMap<i64, Subchannel>,
    sockets: HashMap<i64, Socket>,
    page_size: Option<usize>,
    failing_sockets: Vec<i64>,
    top_channel_cursors: Mutex<Vec<i64>>,
    socket_lookups: Mutex<Vec<i64>>,
    subchannel_lookups: Mutex<Vec<i64>>,
}

impl FakeChannelz {
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn with_top_channels(mut self, channels: Vec<Channel>) -> Self {
        self.top_channels = channels;
        self
    }

    pub fn with_servers(mut self, servers: Vec<Server>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_server_sockets(mut self, server_id: i64, refs: Vec<Reference>) -> Self {
        self.server_sockets.insert(server_id, refs);
        self
    }

    pub fn with_subchannel(mut self, subchannel: Subchannel) -> Self {
        self.subchannels.insert(subchannel.reference.id, subchannel);
        self
    }

    pub fn with_socket(mut self, socket: Socket) -> Self {
        self.sockets.insert(socket.reference.id, socket);
        self
    }

    /// Make `GetSocket` for this id fail with UNAVAILABLE.
    pub fn with_failing_socket(mut self, socket_id: i64) -> Self {
        self.failing_sockets.push(socket_id);
        self
    }

    pub fn top_channel_cursors(&self) -> Vec<i64> {
        self.top_channel_cursors.lock().unwrap().clone()
    }

    pub fn socket_lookups(&self) -> Vec<i64> {
        self.socket_lookups.lock().unwrap().clone()
    }

    pub fn subchannel_lookups(&self) -> Vec<i64> {
        self.subchannel_lookups.lock().unwrap().clone()
    }

    fn page<E: Identified + Clone>(&self, items: &[E], start: i64) -> Page<E> {
        let eligible: Vec<E> = items.iter().filter(|e| e.id() >= start).cloned().collect();
        let size = self.page_size.unwrap_or(eligible.len());
        let end = eligible.len() <= size;
        Page {
            items: eligible.into_iter().take(size).collect(),
            end,
        }
    }
}

#[async_trait]
impl ChannelzApi for FakeChannelz {
    async fn top_channels(
        &self,
        start_channel_id: i64,
        _timeout: Option<Duration>,
    ) -> Result<Page<Channel>, ChannelzError> {
        self.top_channel_cursors
            .lock()
            .unwrap()
            .push(start_channel_id);
        Ok(self.page(&self.top_channels, start_channel_id))
    }

    async fn servers(
        &self,
        start_server_id: i64,
        _timeout: Option<Duration>,
    ) -> Result<Page<Server>, ChannelzError> {
        Ok(self.page(&self.servers, start_server_id))
    }

    async fn server_sockets(
        &self,
        server_id: i64,
        start_socket_id: i64,
        _timeout: Option<Duration>,
    ) -> Result<Page<Reference>, ChannelzError> {
        let refs = self
            .server_sockets
            .get(&server_id)
            .cloned()
            .unwrap_or_default();
        Ok(self.page(&refs, start_socket_id))
    }

    async fn subchannel(&self, subchannel_id: i64) -> Result<Subchannel, ChannelzError> {
        self.subchannel_lookups.lock().unwrap().push(subchannel_id);
        self.subchannels
            .get(&subchannel_id)
            .cloned()
            .ok_or_else(|| ChannelzError::Rpc {
                rpc: "GetSubchannel",
                status: tonic::Status::not_found(format!("subchannel {subchannel_id}")),
            })
    }

    async fn socket(&self, socket_id: i64) -> Result<Option<Socket>, ChannelzError> {
        self.socket_lookups.lock().unwrap().push(socket_id);
        if self.failing_sockets.contains(&socket_id) {
            return Err(ChannelzError::Rpc {
                rpc: "GetSocket",
                status: tonic::Status::unavailable("connection reset"),
            });
        }
        Ok(self.sockets.get(&socket_id).cloned())
    }
}
