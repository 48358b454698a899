// External crates
use chrono::{DateTime, Utc};
use std::fmt;

/// Identity handle for a channel, subchannel, server or socket.
///
/// `id` is authoritative for equality, `name` is best-effort and not unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    pub id: i64,
    pub name: String,
}

impl Reference {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "ID:{}", self.id)
        } else {
            write!(f, "ID:{}, Name:{}", self.id, self.name)
        }
    }
}

/// Call counters sampled at fetch time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallCounters {
    pub calls_started: u64,
    pub calls_succeeded: u64,
    pub calls_failed: u64,
    pub last_call_started_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectivityState {
    #[default]
    Unknown,
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl ConnectivityState {
    /// Protocol enum name, e.g. `TRANSIENT_FAILURE`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Severity {
    #[default]
    Unknown,
    Normal,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "UNKNOWN",
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub severity: Severity,
    pub description: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Recent events recorded by the server for a channel or server.
///
/// The server keeps a bounded ring of events, so `num_events_logged` may be
/// larger than `events.len()`. Events are in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub num_events_logged: u64,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub events: Vec<TraceEvent>,
}

/// A channel or a subchannel; both carry the same shape on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub reference: Reference,
    pub state: ConnectivityState,
    pub target: String,
    pub calls: CallCounters,
    pub trace: Option<Trace>,
    pub channel_ref: Vec<Reference>,
    pub subchannel_ref: Vec<Reference>,
    pub socket_ref: Vec<Reference>,
}

pub type Subchannel = Channel;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Server {
    pub reference: Reference,
    pub calls: CallCounters,
    pub trace: Option<Trace>,
    pub listen_socket: Vec<Reference>,
}

/// Socket endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    TcpipAddress { ip_address: Vec<u8>, port: i32 },
    UdsAddress { filename: String },
    OtherAddress { name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Security {
    #[default]
    None,
    Tls {
        cipher_suite: Option<CipherSuite>,
    },
    Other {
        name: String,
    },
}

impl Security {
    /// Short model label used by the detail view
    pub fn model(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tls { .. } => "tls",
            Self::Other { .. } => "other",
        }
    }
}

/// TLS cipher suite, either an IANA standard name or an implementation specific one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherSuite {
    Standard(String),
    Other(String),
}

impl CipherSuite {
    pub fn name(&self) -> &str {
        match self {
            Self::Standard(name) | Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamCounters {
    pub streams_started: u64,
    pub streams_succeeded: u64,
    pub streams_failed: u64,
    pub last_local_stream_created_timestamp: Option<DateTime<Utc>>,
    pub last_remote_stream_created_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageCounters {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub last_message_sent_timestamp: Option<DateTime<Utc>>,
    pub last_message_received_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOption {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Socket {
    pub reference: Reference,
    pub local: Option<Address>,
    pub remote: Option<Address>,
    pub remote_name: String,
    pub streams: StreamCounters,
    pub messages: MessageCounters,
    pub keep_alives_sent: u64,
    pub local_flow_control_window: Option<i64>,
    pub remote_flow_control_window: Option<i64>,
    pub option: Vec<SocketOption>,
    pub security: Security,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<E> {
    pub items: Vec<E>,
    pub end: bool,
}

/// Anything addressable through a [`Reference`].
pub trait Identified {
    fn reference(&self) -> &Reference;

    fn id(&self) -> i64 {
        self.reference().id
    }
}

impl Identified for Reference {
    fn reference(&self) -> &Reference {
        self
    }
}

impl Identified for Channel {
    fn reference(&self) -> &Reference {
        &self.reference
    }
}

impl Identified for Server {
    fn reference(&self) -> &Reference {
        &self.reference
    }
}

impl Identified for Socket {
    fn reference(&self) -> &Reference {
        &self.reference
    }
}
