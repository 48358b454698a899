//! Command bodies for `list`, `describe` and `tree`.
//!
//! Each operation wires a traversal (or a resolver lookup) to the renderer, streaming
//! rows as entities arrive. Policies per listing:
//! - top channels retry with a growing timeout and stop quietly on cancellation,
//! - servers, server sockets and by-id lookups abort on the first RPC error.

// Local crates
use crate::channelz::client::{ChannelzApi, ChannelzError};
use crate::channelz::resolver::{Token, find_server, find_server_socket, find_top_channel};
use crate::channelz::traversal::{TraversalPolicy, traverse};
use crate::channelz::tree::TreeAssembler;
use crate::models::models::{Channel, Reference, Server};
use crate::render::renderer::Renderer;

// External crates
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct InspectorOptions {
    /// Base of the growing per-attempt timeout used by the top channel listing
    pub retry_base_timeout: Duration,
    pub max_expansion_depth: usize,
    /// Command-wide cancellation, observed by the top channel listing before each attempt
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub struct Inspector<'a, C, W> {
    client: &'a C,
    renderer: Renderer<W>,
    options: InspectorOptions,
}

impl<'a, C: ChannelzApi, W: Write> Inspector<'a, C, W> {
    pub fn new(client: &'a C, renderer: Renderer<W>, options: InspectorOptions) -> Self {
        Self {
            client,
            renderer,
            options,
        }
    }

    #[cfg(test)]
    pub fn into_renderer(self) -> Renderer<W> {
        self.renderer
    }

    fn top_channel_policy(&self) -> TraversalPolicy {
        TraversalPolicy::top_channels(
            self.options.retry_base_timeout,
            self.options.cancel.clone(),
        )
    }

    #[instrument(name = "channelz_inspector::list_top_channels", skip_all, level = "debug")]
    pub async fn list_top_channels(&mut self) -> Result<(), ChannelzError> {
        let policy = self.top_channel_policy();
        let client = self.client;
        let renderer = &mut self.renderer;
        let now = renderer.now();

        renderer.top_channels_header()?;
        let summary = traverse(
            &policy,
            async |cursor, limit| client.top_channels(cursor, limit).await,
            async |channel: Channel| renderer.top_channel_row(&channel, now),
        )
        .await?;

        if summary.cancelled {
            renderer.incomplete("channel")?;
        }
        Ok(())
    }

    #[instrument(name = "channelz_inspector::list_servers", skip_all, level = "debug")]
    pub async fn list_servers(&mut self) -> Result<(), ChannelzError> {
        let client = self.client;
        let renderer = &mut self.renderer;
        let now = renderer.now();
        let json = renderer.is_json();

        renderer.servers_header()?;
        traverse(
            &TraversalPolicy::servers(),
            async |cursor, limit| client.servers(cursor, limit).await,
            async |server: Server| {
                // only the first listen socket feeds the LocalAddr column
                let listen = match server.listen_socket.first() {
                    Some(r) if !json => client.socket(r.id).await?,
                    _ => None,
                };
                renderer.server_row(&server, listen.as_ref(), now)
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "channelz_inspector::list_server_sockets", skip_all, level = "debug")]
    pub async fn list_server_sockets(&mut self) -> Result<(), ChannelzError> {
        let client = self.client;
        let renderer = &mut self.renderer;
        let now = renderer.now();

        renderer.server_sockets_header()?;
        traverse(
            &TraversalPolicy::servers(),
            async |cursor, limit| client.servers(cursor, limit).await,
            async |server: Server| {
                let server_id = server.reference.id;
                traverse(
                    &TraversalPolicy::server_sockets(),
                    async |cursor, limit| client.server_sockets(server_id, cursor, limit).await,
                    async |r: Reference| match client.socket(r.id).await? {
                        Some(socket) => renderer.server_socket_row(server_id, &socket, now),
                        None => {
                            tracing::debug!(
                                server_id,
                                socket_id = r.id,
                                "Server socket disappeared before it could be fetched"
                            );
                            Ok(())
                        }
                    },
                )
                .await
                .map(|_| ())
            },
        )
        .await?;
        Ok(())
    }

    #[instrument(name = "channelz_inspector::describe_channel", skip(self), level = "debug")]
    pub async fn describe_channel(&mut self, target: &str) -> Result<(), ChannelzError> {
        let policy = self.top_channel_policy();
        let token = Token::parse(target);
        let Some(channel) = find_top_channel(self.client, &policy, &token).await? else {
            return self.renderer.not_found("channel", target);
        };

        let mut subchannels = Vec::with_capacity(channel.subchannel_ref.len());
        if !self.renderer.is_json() {
            for r in &channel.subchannel_ref {
                subchannels.push(self.client.subchannel(r.id).await?);
            }
        }
        self.renderer.describe_channel(&channel, &subchannels)
    }

    #[instrument(name = "channelz_inspector::describe_server", skip(self), level = "debug")]
    pub async fn describe_server(&mut self, target: &str) -> Result<(), ChannelzError> {
        match find_server(self.client, &Token::parse(target)).await? {
            Some(server) => self.renderer.describe_server(&server),
            None => self.renderer.not_found("server", target),
        }
    }

    #[instrument(name = "channelz_inspector::describe_server_socket", skip(self), level = "debug")]
    pub async fn describe_server_socket(&mut self, target: &str) -> Result<(), ChannelzError> {
        match find_server_socket(self.client, &Token::parse(target)).await? {
            Some(socket) => self.renderer.describe_socket(&socket),
            None => self.renderer.not_found("serversocket", target),
        }
    }

    #[instrument(name = "channelz_inspector::tree_top_channels", skip_all, level = "debug")]
    pub async fn tree_top_channels(&mut self) -> Result<(), ChannelzError> {
        let policy = self.top_channel_policy();
        let client = self.client;
        let assembler = TreeAssembler::new(client, self.options.max_expansion_depth);
        let renderer = &mut self.renderer;
        let now = renderer.now();

        let summary = traverse(
            &policy,
            async |cursor, limit| client.top_channels(cursor, limit).await,
            async |channel: Channel| {
                let node = assembler.assemble_channel(channel).await?;
                renderer.channel_tree(&node, now)
            },
        )
        .await?;

        if summary.cancelled {
            renderer.incomplete("channel")?;
        }
        Ok(())
    }

    #[instrument(name = "channelz_inspector::tree_servers", skip_all, level = "debug")]
    pub async fn tree_servers(&mut self) -> Result<(), ChannelzError> {
        let client = self.client;
        let assembler = TreeAssembler::new(client, self.options.max_expansion_depth);
        let renderer = &mut self.renderer;
        let now = renderer.now();

        traverse(
            &TraversalPolicy::servers(),
            async |cursor, limit| client.servers(cursor, limit).await,
            async |server: Server| {
                let node = assembler.assemble_server(server).await?;
                renderer.server_tree(&node, now)
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channelz::fake::FakeChannelz;
    use crate::channelz::tree::DEFAULT_MAX_EXPANSION_DEPTH;
    use crate::models::models::{Address, Socket};
    use crate::render::renderer::RenderMode;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    fn inspector(fake: &FakeChannelz, mode: RenderMode) -> Inspector<'_, FakeChannelz, Vec<u8>> {
        Inspector::new(
            fake,
            Renderer::new(Vec::new(), mode, Arc::new(fixed_now)),
            InspectorOptions {
                retry_base_timeout: Duration::from_secs(5),
                max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
                cancel: CancellationToken::new(),
            },
        )
    }

    fn output(inspector: Inspector<'_, FakeChannelz, Vec<u8>>) -> String {
        String::from_utf8(inspector.into_renderer().into_inner()).unwrap()
    }

    fn channel(id: i64, name: &str) -> Channel {
        Channel {
            reference: Reference::new(id, name),
            target: format!("dns:///svc-{id}"),
            ..Default::default()
        }
    }

    fn tcp(octets: [u8; 4], port: i32) -> Option<Address> {
        Some(Address::TcpipAddress {
            ip_address: octets.to_vec(),
            port,
        })
    }

    #[tokio::test]
    async fn json_channel_listing_spans_pages() {
        let fake = FakeChannelz::default().with_page_size(2).with_top_channels(vec![
            channel(1, "a"),
            channel(4, "b"),
            channel(9, "c"),
        ]);

        let mut inspector = inspector(&fake, RenderMode::Json);
        inspector.list_top_channels().await.unwrap();
        let text = output(inspector);

        let ids: Vec<i64> = text
            .lines()
            .map(|l| {
                let record: serde_json::Value = serde_json::from_str(l).unwrap();
                record["ref"]["channel_id"].as_i64().unwrap()
            })
            .collect();
        assert_eq!(ids, vec![1, 4, 9]);
        assert_eq!(fake.top_channel_cursors(), vec![0, 5]);
    }

    #[tokio::test]
    async fn server_listing_looks_up_first_listen_socket_only() {
        let server = Server {
            reference: Reference::new(1, ""),
            listen_socket: vec![Reference::new(10, ""), Reference::new(11, "")],
            ..Default::default()
        };
        let fake = FakeChannelz::default()
            .with_servers(vec![server])
            .with_socket(Socket {
                reference: Reference::new(10, ""),
                local: tcp([127, 0, 0, 1], 50051),
                ..Default::default()
            });

        let mut inspector = inspector(&fake, RenderMode::Table);
        inspector.list_servers().await.unwrap();
        let text = output(inspector);

        assert_eq!(fake.socket_lookups(), vec![10]);
        assert!(text.lines().nth(1).unwrap().contains("[127.0.0.1]:50051"));
    }

    #[tokio::test]
    async fn server_socket_listing_walks_every_server() {
        let fake = FakeChannelz::default()
            .with_servers(vec![
                Server {
                    reference: Reference::new(1, ""),
                    ..Default::default()
                },
                Server {
                    reference: Reference::new(2, ""),
                    ..Default::default()
                },
            ])
            .with_server_sockets(1, vec![Reference::new(21, "")])
            .with_server_sockets(2, vec![Reference::new(22, ""), Reference::new(23, "")])
            .with_socket(Socket {
                reference: Reference::new(21, ""),
                remote: tcp([10, 1, 1, 1], 40000),
                ..Default::default()
            })
            .with_socket(Socket {
                reference: Reference::new(22, ""),
                ..Default::default()
            });

        let mut inspector = inspector(&fake, RenderMode::Table);
        inspector.list_server_sockets().await.unwrap();
        let text = output(inspector);

        let rows: Vec<Vec<&str>> = text
            .lines()
            .skip(1)
            .map(|l| l.split_whitespace().collect())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][..2], &["21", "1"]);
        assert_eq!(rows[0][5], "[10.1.1.1]:40000");
        assert_eq!(&rows[1][..2], &["22", "2"]);
        assert_eq!(fake.socket_lookups(), vec![21, 22, 23]);
    }

    #[tokio::test]
    async fn describe_unknown_channel_reports_not_found() {
        let fake = FakeChannelz::default().with_top_channels(vec![channel(1, "a")]);

        let mut inspector = inspector(&fake, RenderMode::Detail);
        inspector.describe_channel("missing").await.unwrap();

        assert_eq!(output(inspector), "channel \"missing\" not found\n");
    }

    #[tokio::test]
    async fn describe_channel_fetches_subchannels() {
        let mut root = channel(1, "a");
        root.subchannel_ref = vec![Reference::new(20, "")];
        let fake = FakeChannelz::default()
            .with_top_channels(vec![root])
            .with_subchannel(channel(20, "sub"));

        let mut inspector = inspector(&fake, RenderMode::Detail);
        inspector.describe_channel("1").await.unwrap();
        let text = output(inspector);

        assert_eq!(fake.subchannel_lookups(), vec![20]);
        assert!(text.contains("Subchannels:\n"));
        assert!(text.contains("sub"));
    }

    #[tokio::test]
    async fn describe_server_socket_with_name_is_not_found() {
        let fake = FakeChannelz::default();

        let mut inspector = inspector(&fake, RenderMode::Detail);
        inspector.describe_server_socket("listener").await.unwrap();

        assert_eq!(output(inspector), "serversocket \"listener\" not found\n");
        assert!(fake.socket_lookups().is_empty());
    }

    #[tokio::test]
    async fn channel_tree_expands_one_subchannel() {
        let mut root = channel(1, "a");
        root.subchannel_ref = vec![Reference::new(20, "")];
        let mut sub = channel(20, "");
        sub.subchannel_ref = vec![Reference::new(30, "")];
        let fake = FakeChannelz::default()
            .with_top_channels(vec![root])
            .with_subchannel(sub);

        let mut inspector = inspector(&fake, RenderMode::Detail);
        inspector.tree_top_channels().await.unwrap();
        let text = output(inspector);

        assert_eq!(text.matches("|-- ").count(), 1);
        assert_eq!(text.matches("[Socket]").count(), 0);
        assert!(text.contains("[Subchannel] ID:30"));
        assert_eq!(fake.subchannel_lookups(), vec![20]);
    }

    #[tokio::test]
    async fn server_tree_marks_missing_sockets() {
        let fake = FakeChannelz::default().with_servers(vec![Server {
            reference: Reference::new(3, "srv"),
            listen_socket: vec![Reference::new(99, "")],
            ..Default::default()
        }]);

        let mut inspector = inspector(&fake, RenderMode::Detail);
        inspector.tree_servers().await.unwrap();
        let text = output(inspector);

        assert!(text.starts_with("ID: 3, Name: srv\n"));
        assert!(text.contains("[Socket] ID:99 not found"));
    }
}
