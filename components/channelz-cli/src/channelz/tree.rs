//! Tree assembler
//!
//! Expands a top-level channel or server into a renderable tree by fetching the
//! sockets and subchannels it references, one RPC per reference.
//!
//! The channelz reference graph is not guaranteed to be acyclic, so expansion is
//! bounded by `max_expansion_depth` (levels of subchannels below the root). Child
//! channel references are never followed, and subchannel references found at the
//! depth limit are kept as opaque references.

// Local crates
use crate::channelz::client::{ChannelzApi, ChannelzError};
use crate::models::models::{Channel, Reference, Server, Socket};

// External crates
use tracing::instrument;

/// Subchannel levels expanded below a root channel.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum SocketNode {
    Found(Box<Socket>),
    NotFound { socket_id: i64 },
}

/// A channel (or subchannel) with its directly referenced entities resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelNode {
    pub channel: Channel,
    pub sockets: Vec<SocketNode>,
    pub subchannels: Vec<ChannelNode>,
    /// Child channel refs. Never expanded.
    pub opaque_channels: Vec<Reference>,
    /// Subchannel refs at or past the depth limit.
    pub opaque_subchannels: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerNode {
    pub server: Server,
    pub listen_sockets: Vec<SocketNode>,
}

#[derive(Debug)]
pub struct TreeAssembler<'a, C> {
    client: &'a C,
    max_expansion_depth: usize,
}

impl<'a, C: ChannelzApi> TreeAssembler<'a, C> {
    pub fn new(client: &'a C, max_expansion_depth: usize) -> Self {
        Self {
            client,
            max_expansion_depth,
        }
    }

    #[instrument(
        name = "channelz_tree::channel",
        skip_all,
        fields(channel_id = root.reference.id),
        level = "debug"
    )]
    pub async fn assemble_channel(&self, root: Channel) -> Result<ChannelNode, ChannelzError> {
        self.expand(root, 0).await
    }

    #[instrument(
        name = "channelz_tree::server",
        skip_all,
        fields(server_id = root.reference.id),
        level = "debug"
    )]
    pub async fn assemble_server(&self, root: Server) -> Result<ServerNode, ChannelzError> {
        let listen_sockets = self.sockets(&root.listen_socket).await?;
        Ok(ServerNode {
            server: root,
            listen_sockets,
        })
    }

    async fn expand(&self, channel: Channel, depth: usize) -> Result<ChannelNode, ChannelzError> {
        let sockets = self.sockets(&channel.socket_ref).await?;

        let mut subchannels = Vec::new();
        let mut opaque_subchannels = Vec::new();
        if depth < self.max_expansion_depth {
            for reference in &channel.subchannel_ref {
                let subchannel = self.client.subchannel(reference.id).await?;
                subchannels.push(Box::pin(self.expand(subchannel, depth + 1)).await?);
            }
        } else {
            tracing::debug!(
                channel_id = channel.reference.id,
                depth,
                refs = channel.subchannel_ref.len(),
                "Expansion depth reached, keeping subchannel refs opaque"
            );
            opaque_subchannels = channel.subchannel_ref.clone();
        }

        Ok(ChannelNode {
            opaque_channels: channel.channel_ref.clone(),
            channel,
            sockets,
            subchannels,
            opaque_subchannels,
        })
    }

    async fn sockets(&self, refs: &[Reference]) -> Result<Vec<SocketNode>, ChannelzError> {
        let mut nodes = Vec::with_capacity(refs.len());
        for reference in refs {
            let node = match self.client.socket(reference.id).await? {
                Some(socket) => SocketNode::Found(Box::new(socket)),
                None => SocketNode::NotFound {
                    socket_id: reference.id,
                },
            };
            nodes.push(node);
        }
        Ok(nodes)
    }
}
