//! Protocol shaped JSON views
//!
//! `--json` records keep the `grpc.channelz.v1` message layout and field names:
//! references carry `<kind>_id`, counters, state and trace sit under `data`, and oneofs
//! are keyed by their field name (`tcpip_address`, `tls`, ...). Byte fields are base64
//! and unset sub-messages are omitted, as in the protobuf JSON mapping. Views borrow
//! from the model and only live for the duration of one write.

// Local crates
use crate::channelz::tree::{ChannelNode, ServerNode, SocketNode};
use crate::models::models::{
    Address, CipherSuite, Channel, Reference, Security, Server, Severity, Socket, Trace,
};

// External crates
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Which reference message a [`Reference`] stands for on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Channel,
    Subchannel,
    Server,
    Socket,
}

impl RefKind {
    fn id_field(self) -> &'static str {
        match self {
            Self::Channel => "channel_id",
            Self::Subchannel => "subchannel_id",
            Self::Server => "server_id",
            Self::Socket => "socket_id",
        }
    }
}

struct WireRef<'a> {
    kind: RefKind,
    reference: &'a Reference,
}

impl Serialize for WireRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.kind.id_field(), &self.reference.id)?;
        map.serialize_entry("name", &self.reference.name)?;
        map.end()
    }
}

struct WireRefs<'a> {
    kind: RefKind,
    refs: &'a [Reference],
}

impl Serialize for WireRefs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.refs.iter().map(|reference| WireRef {
            kind: self.kind,
            reference,
        }))
    }
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Unknown => "CT_UNKNOWN",
        Severity::Normal => "CT_INFO",
        Severity::Warning => "CT_WARNING",
        Severity::Error => "CT_ERROR",
    }
}

#[derive(Serialize)]
struct WireTraceEvent<'a> {
    description: &'a str,
    severity: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct WireTrace<'a> {
    num_events_logged: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    creation_timestamp: Option<DateTime<Utc>>,
    events: Vec<WireTraceEvent<'a>>,
}

impl<'a> WireTrace<'a> {
    fn new(trace: &'a Trace) -> Self {
        Self {
            num_events_logged: trace.num_events_logged,
            creation_timestamp: trace.creation_timestamp,
            events: trace
                .events
                .iter()
                .map(|ev| WireTraceEvent {
                    description: &ev.description,
                    severity: severity_name(ev.severity),
                    timestamp: ev.timestamp,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct WireState {
    state: &'static str,
}

#[derive(Serialize)]
struct WireChannelData<'a> {
    state: WireState,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<WireTrace<'a>>,
    calls_started: u64,
    calls_succeeded: u64,
    calls_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_call_started_timestamp: Option<DateTime<Utc>>,
}

/// `Channel` or `Subchannel` message, depending on the kind passed to [`WireChannel::new`].
#[derive(Serialize)]
pub struct WireChannel<'a> {
    #[serde(rename = "ref")]
    reference: WireRef<'a>,
    data: WireChannelData<'a>,
    channel_ref: WireRefs<'a>,
    subchannel_ref: WireRefs<'a>,
    socket_ref: WireRefs<'a>,
}

impl<'a> WireChannel<'a> {
    pub fn new(channel: &'a Channel, kind: RefKind) -> Self {
        Self {
            reference: WireRef {
                kind,
                reference: &channel.reference,
            },
            data: WireChannelData {
                state: WireState {
                    state: channel.state.as_str(),
                },
                target: &channel.target,
                trace: channel.trace.as_ref().map(WireTrace::new),
                calls_started: channel.calls.calls_started,
                calls_succeeded: channel.calls.calls_succeeded,
                calls_failed: channel.calls.calls_failed,
                last_call_started_timestamp: channel.calls.last_call_started_timestamp,
            },
            channel_ref: WireRefs {
                kind: RefKind::Channel,
                refs: &channel.channel_ref,
            },
            subchannel_ref: WireRefs {
                kind: RefKind::Subchannel,
                refs: &channel.subchannel_ref,
            },
            socket_ref: WireRefs {
                kind: RefKind::Socket,
                refs: &channel.socket_ref,
            },
        }
    }
}

#[derive(Serialize)]
struct WireServerData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<WireTrace<'a>>,
    calls_started: u64,
    calls_succeeded: u64,
    calls_failed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_call_started_timestamp: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct WireServer<'a> {
    #[serde(rename = "ref")]
    reference: WireRef<'a>,
    data: WireServerData<'a>,
    listen_socket: WireRefs<'a>,
}

impl<'a> WireServer<'a> {
    pub fn new(server: &'a Server) -> Self {
        Self {
            reference: WireRef {
                kind: RefKind::Server,
                reference: &server.reference,
            },
            data: WireServerData {
                trace: server.trace.as_ref().map(WireTrace::new),
                calls_started: server.calls.calls_started,
                calls_succeeded: server.calls.calls_succeeded,
                calls_failed: server.calls.calls_failed,
                last_call_started_timestamp: server.calls.last_call_started_timestamp,
            },
            listen_socket: WireRefs {
                kind: RefKind::Socket,
                refs: &server.listen_socket,
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum WireAddress<'a> {
    TcpipAddress { ip_address: String, port: i32 },
    UdsAddress { filename: &'a str },
    OtherAddress { name: &'a str },
}

impl<'a> WireAddress<'a> {
    fn new(address: &'a Address) -> Self {
        match address {
            Address::TcpipAddress { ip_address, port } => Self::TcpipAddress {
                ip_address: STANDARD.encode(ip_address),
                port: *port,
            },
            Address::UdsAddress { filename } => Self::UdsAddress {
                filename: filename.as_str(),
            },
            Address::OtherAddress { name } => Self::OtherAddress {
                name: name.as_str(),
            },
        }
    }
}

#[derive(Serialize)]
struct WireTls<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    standard_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    other_name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum WireSecurity<'a> {
    Tls(WireTls<'a>),
    Other { name: &'a str },
}

impl<'a> WireSecurity<'a> {
    /// `None` when the socket has no security model.
    fn new(security: &'a Security) -> Option<Self> {
        match security {
            Security::None => None,
            Security::Tls { cipher_suite } => Some(Self::Tls(WireTls {
                standard_name: match cipher_suite {
                    Some(CipherSuite::Standard(name)) => Some(name.as_str()),
                    _ => None,
                },
                other_name: match cipher_suite {
                    Some(CipherSuite::Other(name)) => Some(name.as_str()),
                    _ => None,
                },
            })),
            Security::Other { name } => Some(Self::Other {
                name: name.as_str(),
            }),
        }
    }
}

#[derive(Serialize)]
struct WireSocketOption<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct WireSocketData<'a> {
    streams_started: u64,
    streams_succeeded: u64,
    streams_failed: u64,
    messages_sent: u64,
    messages_received: u64,
    keep_alives_sent: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_local_stream_created_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_remote_stream_created_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_message_sent_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_message_received_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_flow_control_window: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_flow_control_window: Option<i64>,
    option: Vec<WireSocketOption<'a>>,
}

#[derive(Serialize)]
pub struct WireSocket<'a> {
    #[serde(rename = "ref")]
    reference: WireRef<'a>,
    data: WireSocketData<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local: Option<WireAddress<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<WireAddress<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security: Option<WireSecurity<'a>>,
    remote_name: &'a str,
}

impl<'a> WireSocket<'a> {
    pub fn new(socket: &'a Socket) -> Self {
        Self {
            reference: WireRef {
                kind: RefKind::Socket,
                reference: &socket.reference,
            },
            data: WireSocketData {
                streams_started: socket.streams.streams_started,
                streams_succeeded: socket.streams.streams_succeeded,
                streams_failed: socket.streams.streams_failed,
                messages_sent: socket.messages.messages_sent,
                messages_received: socket.messages.messages_received,
                keep_alives_sent: socket.keep_alives_sent,
                last_local_stream_created_timestamp: socket
                    .streams
                    .last_local_stream_created_timestamp,
                last_remote_stream_created_timestamp: socket
                    .streams
                    .last_remote_stream_created_timestamp,
                last_message_sent_timestamp: socket.messages.last_message_sent_timestamp,
                last_message_received_timestamp: socket.messages.last_message_received_timestamp,
                local_flow_control_window: socket.local_flow_control_window,
                remote_flow_control_window: socket.remote_flow_control_window,
                option: socket
                    .option
                    .iter()
                    .map(|opt| WireSocketOption {
                        name: &opt.name,
                        value: &opt.value,
                    })
                    .collect(),
            },
            local: socket.local.as_ref().map(WireAddress::new),
            remote: socket.remote.as_ref().map(WireAddress::new),
            security: WireSecurity::new(&socket.security),
            remote_name: &socket.remote_name,
        }
    }
}

#[derive(Serialize)]
struct MissingSocketRef {
    socket_id: i64,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireSocketNode<'a> {
    Found(WireSocket<'a>),
    NotFound {
        #[serde(rename = "ref")]
        reference: MissingSocketRef,
        not_found: bool,
    },
}

impl<'a> WireSocketNode<'a> {
    fn new(node: &'a SocketNode) -> Self {
        match node {
            SocketNode::Found(socket) => Self::Found(WireSocket::new(socket)),
            SocketNode::NotFound { socket_id } => Self::NotFound {
                reference: MissingSocketRef {
                    socket_id: *socket_id,
                },
                not_found: true,
            },
        }
    }
}

/// Channel message with its resolved sockets and expanded subchannels alongside.
/// Refs left unexpanded are still listed in `channel_ref` and `subchannel_ref`.
#[derive(Serialize)]
pub struct WireChannelNode<'a> {
    #[serde(flatten)]
    channel: WireChannel<'a>,
    sockets: Vec<WireSocketNode<'a>>,
    subchannels: Vec<WireChannelNode<'a>>,
}

impl<'a> WireChannelNode<'a> {
    pub fn new(node: &'a ChannelNode, kind: RefKind) -> Self {
        Self {
            channel: WireChannel::new(&node.channel, kind),
            sockets: node.sockets.iter().map(WireSocketNode::new).collect(),
            subchannels: node
                .subchannels
                .iter()
                .map(|sub| WireChannelNode::new(sub, RefKind::Subchannel))
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct WireServerNode<'a> {
    #[serde(flatten)]
    server: WireServer<'a>,
    listen_sockets: Vec<WireSocketNode<'a>>,
}

impl<'a> WireServerNode<'a> {
    pub fn new(node: &'a ServerNode) -> Self {
        Self {
            server: WireServer::new(&node.server),
            listen_sockets: node.listen_sockets.iter().map(WireSocketNode::new).collect(),
        }
    }
}
