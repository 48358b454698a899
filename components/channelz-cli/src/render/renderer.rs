//! Renderer
//!
//! Writes entities to the output sink in one of three modes:
//! - `Table`: one header row, then one fixed-width row per entity,
//! - `Detail`: labeled sections with indented sub-tables (also used for tree text),
//! - `Json`: one channelz message per entity (see [`crate::render::wire`]), newline
//!   terminated, flushed as it is written.
//!
//! Relative times are computed against an injected [`Clock`] so output is
//! deterministic under test.

// Local crates
use crate::channelz::client::ChannelzError;
use crate::channelz::tree::{ChannelNode, ServerNode, SocketNode};
use crate::models::models::{CallCounters, Channel, Reference, Security, Server, Socket, Trace};
use crate::render::format::{address, decorate_empty, elapsed, timestamp};
use crate::render::wire::{
    RefKind, WireChannel, WireChannelNode, WireServer, WireServerNode, WireSocket,
};

// External crates
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Zero-argument time source
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Table,
    Detail,
    Json,
}

pub struct Renderer<W> {
    out: W,
    mode: RenderMode,
    clock: Clock,
}

impl<W> fmt::Debug for Renderer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

type RenderResult = Result<(), ChannelzError>;

impl<W: Write> Renderer<W> {
    pub fn new(out: W, mode: RenderMode, clock: Clock) -> Self {
        Self { out, mode, clock }
    }

    pub fn is_json(&self) -> bool {
        self.mode == RenderMode::Json
    }

    /// Sample the clock. Listings sample once and reuse the value for every row.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Stream one JSON record.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> RenderResult {
        serde_json::to_writer(&mut self.out, value)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn not_found(&mut self, kind: &str, token: &str) -> RenderResult {
        writeln!(self.out, "{kind} {token:?} not found")?;
        self.out.flush()?;
        Ok(())
    }

    /// Printed after a retrying listing gave up because the command was cancelled.
    pub fn incomplete(&mut self, kind: &str) -> RenderResult {
        if !self.is_json() {
            writeln!(self.out, "{kind} listing incomplete: command cancelled")?;
        }
        Ok(())
    }

    //
    // ------------------------------- Tables ---------------------------------------
    //

    pub fn top_channels_header(&mut self) -> RenderResult {
        if self.is_json() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{:<6} {:<40} {:<18} {:<8} {:<11} {:<8} {:<8} {:<8} {}",
            "ID", "Name", "State", "Channel", "SubChannel", "Calls", "Success", "Fail", "LastCall"
        )?;
        Ok(())
    }

    pub fn top_channel_row(&mut self, channel: &Channel, now: DateTime<Utc>) -> RenderResult {
        if self.is_json() {
            return self.json(&WireChannel::new(channel, RefKind::Channel));
        }
        writeln!(
            self.out,
            "{:<6} {:<40} {:<18} {:<8} {:<11} {:<8} {:<8} {:<8} {}",
            channel.reference.id,
            decorate_empty(&channel.reference.name),
            channel.state,
            channel.channel_ref.len(),
            channel.subchannel_ref.len(),
            channel.calls.calls_started,
            channel.calls.calls_succeeded,
            channel.calls.calls_failed,
            elapsed(now, channel.calls.last_call_started_timestamp),
        )?;
        self.out.flush()?;
        Ok(())
    }

    pub fn servers_header(&mut self) -> RenderResult {
        if self.is_json() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{:<6} {:<20} {:<24} {:<8} {:<8} {:<8} {}",
            "ID", "Name", "LocalAddr", "Calls", "Success", "Fail", "LastCall"
        )?;
        Ok(())
    }

    /// `listen` is the server's first listen socket, if it has one.
    pub fn server_row(
        &mut self,
        server: &Server,
        listen: Option<&Socket>,
        now: DateTime<Utc>,
    ) -> RenderResult {
        if self.is_json() {
            return self.json(&WireServer::new(server));
        }
        let local = address(listen.and_then(|s| s.local.as_ref()));
        writeln!(
            self.out,
            "{:<6} {:<20} {:<24} {:<8} {:<8} {:<8} {}",
            server.reference.id,
            decorate_empty(&server.reference.name),
            decorate_empty(&local),
            server.calls.calls_started,
            server.calls.calls_succeeded,
            server.calls.calls_failed,
            elapsed(now, server.calls.last_call_started_timestamp),
        )?;
        self.out.flush()?;
        Ok(())
    }

    pub fn server_sockets_header(&mut self) -> RenderResult {
        if self.is_json() {
            return Ok(());
        }
        writeln!(
            self.out,
            "{:<6} {:<8} {:<40} {:<20} {:<24} {:<24} {:<8} {:<8} {:<8} {}",
            "ID",
            "ServerID",
            "Name",
            "RemoteName",
            "Local",
            "Remote",
            "Started",
            "Success",
            "Fail",
            "LastStream"
        )?;
        Ok(())
    }

    pub fn server_socket_row(
        &mut self,
        server_id: i64,
        socket: &Socket,
        now: DateTime<Utc>,
    ) -> RenderResult {
        if self.is_json() {
            return self.json(&WireSocket::new(socket));
        }
        writeln!(
            self.out,
            "{:<6} {:<8} {:<40} {:<20} {:<24} {:<24} {:<8} {:<8} {:<8} {}",
            socket.reference.id,
            server_id,
            decorate_empty(&socket.reference.name),
            decorate_empty(&socket.remote_name),
            decorate_empty(&address(socket.local.as_ref())),
            decorate_empty(&address(socket.remote.as_ref())),
            socket.streams.streams_started,
            socket.streams.streams_succeeded,
            socket.streams.streams_failed,
            elapsed(now, socket.streams.last_remote_stream_created_timestamp),
        )?;
        self.out.flush()?;
        Ok(())
    }

    //
    // ------------------------------- Detail ---------------------------------------
    //

    /// `subchannels` are the resolved entries of `channel.subchannel_ref`.
    pub fn describe_channel(&mut self, channel: &Channel, subchannels: &[Channel]) -> RenderResult {
        if self.is_json() {
            return self.json(&WireChannel::new(channel, RefKind::Channel));
        }
        let out = &mut self.out;
        writeln!(out, "{:<12}{}", "ID:", channel.reference.id)?;
        writeln!(out, "{:<12}{}", "Name:", channel.reference.name)?;
        writeln!(out, "{:<12}{}", "State:", channel.state)?;
        writeln!(out, "{:<12}{}", "Target:", channel.target)?;
        write_calls(out, &channel.calls)?;
        write_refs(out, "Sockets", "SocketID", &channel.socket_ref)?;
        write_refs(out, "Channels", "ChannelID", &channel.channel_ref)?;

        if subchannels.is_empty() {
            writeln!(out, "{:<12}<none>", "Subchannels:")?;
        } else {
            writeln!(out, "Subchannels:")?;
            writeln!(
                out,
                "  {:<8} {:<20} {:<18} {:<8} {:<10} {}",
                "ID", "Name", "State", "Started", "Succeeded", "Failed"
            )?;
            for sub in subchannels {
                writeln!(
                    out,
                    "  {:<8} {:<20} {:<18} {:<8} {:<10} {}",
                    sub.reference.id,
                    decorate_empty(&sub.reference.name),
                    sub.state,
                    sub.calls.calls_started,
                    sub.calls.calls_succeeded,
                    sub.calls.calls_failed,
                )?;
            }
        }

        if let Some(trace) = &channel.trace {
            write_trace(out, trace)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn describe_server(&mut self, server: &Server) -> RenderResult {
        if self.is_json() {
            return self.json(&WireServer::new(server));
        }
        let out = &mut self.out;
        writeln!(out, "{:<12}{}", "ID:", server.reference.id)?;
        writeln!(out, "{:<12}{}", "Name:", server.reference.name)?;
        write_calls(out, &server.calls)?;
        write_refs(out, "ListenSockets", "SocketID", &server.listen_socket)?;
        if let Some(trace) = &server.trace {
            write_trace(out, trace)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn describe_socket(&mut self, socket: &Socket) -> RenderResult {
        if self.is_json() {
            return self.json(&WireSocket::new(socket));
        }
        let out = &mut self.out;
        writeln!(out, "{:<12}{}", "ID:", socket.reference.id)?;
        writeln!(out, "{:<12}{}", "Name:", socket.reference.name)?;
        writeln!(out, "{:<12}{}", "Local:", address(socket.local.as_ref()))?;
        writeln!(out, "{:<12}{}", "Remote:", address(socket.remote.as_ref()))?;
        writeln!(out, "{:<12}{}", "RemoteName:", socket.remote_name)?;

        writeln!(out, "Streams:")?;
        writeln!(out, "  {:<18}{}", "Started:", socket.streams.streams_started)?;
        writeln!(out, "  {:<18}{}", "Succeeded:", socket.streams.streams_succeeded)?;
        writeln!(out, "  {:<18}{}", "Failed:", socket.streams.streams_failed)?;
        writeln!(
            out,
            "  {:<18}{}",
            "LastLocalCreated:",
            timestamp(socket.streams.last_local_stream_created_timestamp)
        )?;
        writeln!(
            out,
            "  {:<18}{}",
            "LastCreated:",
            timestamp(socket.streams.last_remote_stream_created_timestamp)
        )?;

        writeln!(out, "Messages:")?;
        writeln!(out, "  {:<18}{}", "Sent:", socket.messages.messages_sent)?;
        writeln!(out, "  {:<18}{}", "Received:", socket.messages.messages_received)?;
        writeln!(
            out,
            "  {:<18}{}",
            "LastSent:",
            timestamp(socket.messages.last_message_sent_timestamp)
        )?;
        writeln!(
            out,
            "  {:<18}{}",
            "LastReceived:",
            timestamp(socket.messages.last_message_received_timestamp)
        )?;

        writeln!(out, "{:<16}{}", "KeepAlivesSent:", socket.keep_alives_sent)?;
        writeln!(out, "FlowControlWindow:")?;
        writeln!(out, "  {:<18}{}", "Local:", window(socket.local_flow_control_window))?;
        writeln!(out, "  {:<18}{}", "Remote:", window(socket.remote_flow_control_window))?;

        writeln!(out, "Options:")?;
        for opt in &socket.option {
            writeln!(out, "  {}:\t{}", opt.name, opt.value)?;
        }

        writeln!(out, "Security:")?;
        writeln!(out, "  Model: {}", socket.security.model())?;
        match &socket.security {
            Security::Tls {
                cipher_suite: Some(suite),
            } => writeln!(out, "  CipherSuite: {}", suite.name())?,
            Security::Other { name } if !name.is_empty() => {
                writeln!(out, "  Name: {name}")?
            }
            _ => {}
        }
        out.flush()?;
        Ok(())
    }

    //
    // -------------------------------- Trees ---------------------------------------
    //

    pub fn channel_tree(&mut self, node: &ChannelNode, now: DateTime<Utc>) -> RenderResult {
        if self.is_json() {
            return self.json(&WireChannelNode::new(node, RefKind::Channel));
        }
        let out = &mut self.out;
        writeln!(
            out,
            "{} (ID:{}) [{}]",
            node.channel.target, node.channel.reference.id, node.channel.state
        )?;
        write_channel_body(out, node, 2, now)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    pub fn server_tree(&mut self, node: &ServerNode, now: DateTime<Utc>) -> RenderResult {
        if self.is_json() {
            return self.json(&WireServerNode::new(node));
        }
        let out = &mut self.out;
        writeln!(
            out,
            "ID: {}, Name: {}",
            node.server.reference.id, node.server.reference.name
        )?;
        write_calls_line(out, 4, &node.server.calls, now)?;
        for socket in &node.listen_sockets {
            write_socket_line(out, 4, socket)?;
        }
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

fn window(value: Option<i64>) -> String {
    value.map_or_else(|| "none".to_string(), |w| w.to_string())
}

fn write_calls<W: Write>(out: &mut W, calls: &CallCounters) -> std::io::Result<()> {
    writeln!(out, "Calls:")?;
    writeln!(out, "  {:<18}{}", "Started:", calls.calls_started)?;
    writeln!(out, "  {:<18}{}", "Succeeded:", calls.calls_succeeded)?;
    writeln!(out, "  {:<18}{}", "Failed:", calls.calls_failed)?;
    writeln!(
        out,
        "  {:<18}{}",
        "LastCallStarted:",
        timestamp(calls.last_call_started_timestamp)
    )
}

fn write_refs<W: Write>(
    out: &mut W,
    title: &str,
    id_header: &str,
    refs: &[Reference],
) -> std::io::Result<()> {
    if refs.is_empty() {
        return writeln!(out, "{:<12}<none>", format!("{title}:"));
    }
    writeln!(out, "{title}:")?;
    writeln!(out, "  {:<10} {}", id_header, "Name")?;
    for r in refs {
        writeln!(out, "  {:<10} {}", r.id, decorate_empty(&r.name))?;
    }
    Ok(())
}

fn write_trace<W: Write>(out: &mut W, trace: &Trace) -> std::io::Result<()> {
    writeln!(out, "Trace:")?;
    writeln!(out, "  {:<20}{}", "NumEvents:", trace.num_events_logged)?;
    writeln!(
        out,
        "  {:<20}{}",
        "CreationTimestamp:",
        timestamp(trace.creation_timestamp)
    )?;
    if trace.events.is_empty() {
        return Ok(());
    }
    writeln!(out, "  Events:")?;
    writeln!(out, "    {:<8} {:<80} {}", "Severity", "Description", "Timestamp")?;
    for ev in &trace.events {
        writeln!(
            out,
            "    {:<8} {:<80} {}",
            ev.severity,
            ev.description,
            timestamp(ev.timestamp)
        )?;
    }
    Ok(())
}

fn write_calls_line<W: Write>(
    out: &mut W,
    indent: usize,
    calls: &CallCounters,
    now: DateTime<Utc>,
) -> std::io::Result<()> {
    writeln!(
        out,
        "{:indent$}[Calls] Started:{}, Succeeded:{}, Failed:{}, Last:{}",
        "",
        calls.calls_started,
        calls.calls_succeeded,
        calls.calls_failed,
        elapsed(now, calls.last_call_started_timestamp),
    )
}

fn write_socket_line<W: Write>(out: &mut W, indent: usize, node: &SocketNode) -> std::io::Result<()> {
    match node {
        SocketNode::Found(socket) => writeln!(
            out,
            "{:indent$}[Socket] ID:{}, Name:{}, RemoteName:{}, Local:{}, Remote:{}",
            "",
            socket.reference.id,
            decorate_empty(&socket.reference.name),
            decorate_empty(&socket.remote_name),
            decorate_empty(&address(socket.local.as_ref())),
            decorate_empty(&address(socket.remote.as_ref())),
        ),
        SocketNode::NotFound { socket_id } => {
            writeln!(out, "{:indent$}[Socket] ID:{socket_id} not found", "")
        }
    }
}

/// Everything below a channel header. Subchannel blocks nest with a `|--` marker and
/// their bodies indent further.
fn write_channel_body<W: Write>(
    out: &mut W,
    node: &ChannelNode,
    indent: usize,
    now: DateTime<Utc>,
) -> std::io::Result<()> {
    write_calls_line(out, indent, &node.channel.calls, now)?;
    for socket in &node.sockets {
        write_socket_line(out, indent, socket)?;
    }
    for r in &node.opaque_channels {
        writeln!(out, "{:indent$}[Channel] {r}", "")?;
    }
    for r in &node.opaque_subchannels {
        writeln!(out, "{:indent$}[Subchannel] {r}", "")?;
    }
    if !node.subchannels.is_empty() {
        writeln!(out, "{:indent$}[Subchannels]", "")?;
    }
    for sub in &node.subchannels {
        writeln!(
            out,
            "{:width$}|-- {} (ID:{}) [{}]",
            "",
            sub.channel.target,
            sub.channel.reference.id,
            sub.channel.state,
            width = indent + 2
        )?;
        write_channel_body(out, sub, indent + 8, now)?;
    }
    Ok(())
}
