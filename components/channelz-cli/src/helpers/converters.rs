//! This module defines conversions from the generated channelz protobuf types into the
//! read-only entity model rendered by the CLI.
//!
//! These conversions are total. Missing optional sub-messages (`ref`, `data`, `state`)
//! become defaults, and negative counters are clamped to zero.

// Local crates
use crate::models::models::{
    self as model, Address, CallCounters, Channel, ConnectivityState, MessageCounters, Reference, Security,
    Server, Severity, Socket, SocketOption, StreamCounters, Trace, TraceEvent,
};
use crate::proto::channelz as pb;

// External crates
use chrono::{DateTime, Utc};
use prost_types::Timestamp;

/// Convert prost_types::Timestamp -> chrono::DateTime<Utc>
///
/// Out of range values (or negative nanos) are treated as absent.
pub fn timestamp(ts: Option<&Timestamp>) -> Option<DateTime<Utc>> {
    let ts = ts?;
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

fn counter(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl From<pb::ChannelRef> for Reference {
    fn from(r: pb::ChannelRef) -> Self {
        Self::new(r.channel_id, r.name)
    }
}

impl From<pb::SubchannelRef> for Reference {
    fn from(r: pb::SubchannelRef) -> Self {
        Self::new(r.subchannel_id, r.name)
    }
}

impl From<pb::SocketRef> for Reference {
    fn from(r: pb::SocketRef) -> Self {
        Self::new(r.socket_id, r.name)
    }
}

impl From<pb::ServerRef> for Reference {
    fn from(r: pb::ServerRef) -> Self {
        Self::new(r.server_id, r.name)
    }
}

impl From<pb::channel_connectivity_state::State> for ConnectivityState {
    fn from(state: pb::channel_connectivity_state::State) -> Self {
        use pb::channel_connectivity_state::State;
        match state {
            State::Unknown => Self::Unknown,
            State::Idle => Self::Idle,
            State::Connecting => Self::Connecting,
            State::Ready => Self::Ready,
            State::TransientFailure => Self::TransientFailure,
            State::Shutdown => Self::Shutdown,
        }
    }
}

impl From<pb::channel_trace_event::Severity> for Severity {
    fn from(severity: pb::channel_trace_event::Severity) -> Self {
        use pb::channel_trace_event::Severity as Ct;
        match severity {
            Ct::CtUnknown => Self::Unknown,
            Ct::CtInfo => Self::Normal,
            Ct::CtWarning => Self::Warning,
            Ct::CtError => Self::Error,
        }
    }
}

impl From<pb::ChannelTrace> for Trace {
    fn from(trace: pb::ChannelTrace) -> Self {
        Self {
            num_events_logged: counter(trace.num_events_logged),
            creation_timestamp: timestamp(trace.creation_timestamp.as_ref()),
            events: trace
                .events
                .into_iter()
                .map(|ev| TraceEvent {
                    severity: ev.severity().into(),
                    timestamp: timestamp(ev.timestamp.as_ref()),
                    description: ev.description,
                })
                .collect(),
        }
    }
}

/// Shared projection of `ChannelData` used by both channels and subchannels
fn channel_from_parts(
    reference: Reference,
    data: Option<pb::ChannelData>,
    channel_ref: Vec<pb::ChannelRef>,
    subchannel_ref: Vec<pb::SubchannelRef>,
    socket_ref: Vec<pb::SocketRef>,
) -> Channel {
    let data = data.unwrap_or_default();
    let state = data
        .state
        .as_ref()
        .map(|s| ConnectivityState::from(s.state()))
        .unwrap_or_default();

    Channel {
        reference,
        state,
        target: data.target,
        calls: CallCounters {
            calls_started: counter(data.calls_started),
            calls_succeeded: counter(data.calls_succeeded),
            calls_failed: counter(data.calls_failed),
            last_call_started_timestamp: timestamp(data.last_call_started_timestamp.as_ref()),
        },
        trace: data.trace.map(Trace::from),
        channel_ref: channel_ref.into_iter().map(Reference::from).collect(),
        subchannel_ref: subchannel_ref.into_iter().map(Reference::from).collect(),
        socket_ref: socket_ref.into_iter().map(Reference::from).collect(),
    }
}

impl From<pb::Channel> for Channel {
    fn from(channel: pb::Channel) -> Self {
        channel_from_parts(
            channel.r#ref.map(Reference::from).unwrap_or_default(),
            channel.data,
            channel.channel_ref,
            channel.subchannel_ref,
            channel.socket_ref,
        )
    }
}

impl From<pb::Subchannel> for Channel {
    fn from(subchannel: pb::Subchannel) -> Self {
        channel_from_parts(
            subchannel.r#ref.map(Reference::from).unwrap_or_default(),
            subchannel.data,
            subchannel.channel_ref,
            subchannel.subchannel_ref,
            subchannel.socket_ref,
        )
    }
}

impl From<pb::Server> for Server {
    fn from(server: pb::Server) -> Self {
        let data = server.data.unwrap_or_default();
        Self {
            reference: server.r#ref.map(Reference::from).unwrap_or_default(),
            calls: CallCounters {
                calls_started: counter(data.calls_started),
                calls_succeeded: counter(data.calls_succeeded),
                calls_failed: counter(data.calls_failed),
                last_call_started_timestamp: timestamp(data.last_call_started_timestamp.as_ref()),
            },
            trace: data.trace.map(Trace::from),
            listen_socket: server
                .listen_socket
                .into_iter()
                .map(Reference::from)
                .collect(),
        }
    }
}

/// `Address` messages with no oneof set carry nothing to render and map to `None`.
fn address(addr: Option<pb::Address>) -> Option<Address> {
    use pb::address::Address as Kind;
    match addr?.address? {
        Kind::TcpipAddress(tcp) => Some(Address::TcpipAddress {
            ip_address: tcp.ip_address,
            port: tcp.port,
        }),
        Kind::UdsAddress(uds) => Some(Address::UdsAddress {
            filename: uds.filename,
        }),
        Kind::OtherAddress(other) => Some(Address::OtherAddress { name: other.name }),
    }
}

fn security(security: Option<pb::Security>) -> Security {
    use pb::security::Model;
    use pb::security::tls::CipherSuite;
    match security.and_then(|s| s.model) {
        None => Security::None,
        Some(Model::Tls(tls)) => Security::Tls {
            cipher_suite: tls.cipher_suite.map(|suite| match suite {
                CipherSuite::StandardName(name) => model::CipherSuite::Standard(name),
                CipherSuite::OtherName(name) => model::CipherSuite::Other(name),
            }),
        },
        Some(Model::Other(other)) => Security::Other { name: other.name },
    }
}

impl From<pb::Socket> for Socket {
    fn from(socket: pb::Socket) -> Self {
        let data = socket.data.unwrap_or_default();
        Self {
            reference: socket.r#ref.map(Reference::from).unwrap_or_default(),
            local: address(socket.local),
            remote: address(socket.remote),
            remote_name: socket.remote_name,
            streams: StreamCounters {
                streams_started: counter(data.streams_started),
                streams_succeeded: counter(data.streams_succeeded),
                streams_failed: counter(data.streams_failed),
                last_local_stream_created_timestamp: timestamp(
                    data.last_local_stream_created_timestamp.as_ref(),
                ),
                last_remote_stream_created_timestamp: timestamp(
                    data.last_remote_stream_created_timestamp.as_ref(),
                ),
            },
            messages: MessageCounters {
                messages_sent: counter(data.messages_sent),
                messages_received: counter(data.messages_received),
                last_message_sent_timestamp: timestamp(data.last_message_sent_timestamp.as_ref()),
                last_message_received_timestamp: timestamp(
                    data.last_message_received_timestamp.as_ref(),
                ),
            },
            keep_alives_sent: counter(data.keep_alives_sent),
            local_flow_control_window: data.local_flow_control_window,
            remote_flow_control_window: data.remote_flow_control_window,
            option: data
                .option
                .into_iter()
                .map(|opt| SocketOption {
                    name: opt.name,
                    value: opt.value,
                })
                .collect(),
            security: security(socket.security),
        }
    }
}
