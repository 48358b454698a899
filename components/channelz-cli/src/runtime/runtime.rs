// Local crates
use crate::{
    channelz::{
        client::{ChannelzApi, ChannelzError, GrpcChannelz},
        inspector::{Inspector, InspectorOptions},
    },
    render::renderer::{RenderMode, Renderer, system_clock},
};

// External crates
use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tokio::{signal, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{info, instrument};

/// One resolved command line invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListChannels,
    ListServers,
    ListServerSockets,
    TreeChannels,
    TreeServers,
    DescribeChannel(String),
    DescribeServer(String),
    DescribeServerSocket(String),
}

impl Command {
    /// Listings are tables, everything else is the labeled detail view. `--json` wins.
    pub fn render_mode(&self, json: bool) -> RenderMode {
        match self {
            _ if json => RenderMode::Json,
            Self::ListChannels | Self::ListServers | Self::ListServerSockets => RenderMode::Table,
            _ => RenderMode::Detail,
        }
    }
}

/// Everything a command needs once flags and the config file are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub addr: String,
    pub insecure: bool,
    pub json: bool,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub retry_base_timeout: Duration,
    pub max_expansion_depth: usize,
}

/// Connect, run a single command against the channelz service and release the
/// connection.
#[instrument(name = "channelz_runtime::run", skip_all, fields(addr = %settings.addr), level = "debug")]
pub async fn run_command(command: Command, settings: RunSettings) -> Result<()> {
    let cancel = CancellationToken::new();
    let watchdog = spawn_watchdog(cancel.clone(), settings.command_timeout);

    let result = async {
        let channel = connect(&settings.addr, settings.insecure, settings.connect_timeout)
            .await
            .with_context(|| format!("Failed to connect to {}", settings.addr))?;
        let client = GrpcChannelz::new(channel, cancel.clone());
        let renderer = Renderer::new(
            std::io::stdout(),
            command.render_mode(settings.json),
            system_clock(),
        );

        let outcome = execute(&client, renderer, &command, inspector_options(&settings, &cancel)).await;
        drop(client);
        info!(addr = %settings.addr, "Released channelz connection");
        outcome.with_context(|| format!("Command {command:?} failed"))
    }
    .await;

    watchdog.abort();
    result
}

fn inspector_options(settings: &RunSettings, cancel: &CancellationToken) -> InspectorOptions {
    InspectorOptions {
        retry_base_timeout: settings.retry_base_timeout,
        max_expansion_depth: settings.max_expansion_depth,
        cancel: cancel.clone(),
    }
}

/// Dispatch a command to the matching inspector operation.
pub async fn execute<C, W>(
    client: &C,
    renderer: Renderer<W>,
    command: &Command,
    options: InspectorOptions,
) -> Result<(), ChannelzError>
where
    C: ChannelzApi,
    W: Write,
{
    let mut inspector = Inspector::new(client, renderer, options);
    match command {
        Command::ListChannels => inspector.list_top_channels().await,
        Command::ListServers => inspector.list_servers().await,
        Command::ListServerSockets => inspector.list_server_sockets().await,
        Command::TreeChannels => inspector.tree_top_channels().await,
        Command::TreeServers => inspector.tree_servers().await,
        Command::DescribeChannel(target) => inspector.describe_channel(target).await,
        Command::DescribeServer(target) => inspector.describe_server(target).await,
        Command::DescribeServerSocket(target) => inspector.describe_server_socket(target).await,
    }
}

/// Cancels `cancel` once the command budget is spent or on Ctrl-C.
fn spawn_watchdog(cancel: CancellationToken, budget: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(budget) => {
                tracing::warn!(budget = ?budget, "Command budget exhausted, cancelling");
            }
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                tracing::warn!("Interrupted, cancelling");
            }
        }
        cancel.cancel();
    })
}

/// Prefix a scheme when the address has none: `http` for plaintext, `https` for TLS.
pub fn endpoint_uri(addr: &str, insecure: bool) -> Result<String, ChannelzError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(ChannelzError::MissingAddress);
    }
    if addr.contains("://") {
        return Ok(addr.to_string());
    }
    let scheme = if insecure { "http" } else { "https" };
    Ok(format!("{scheme}://{addr}"))
}

#[instrument(name = "channelz_runtime::connect", skip_all, fields(addr = %addr, insecure = insecure), level = "debug")]
async fn connect(addr: &str, insecure: bool, timeout: Duration) -> Result<Channel, ChannelzError> {
    let uri = endpoint_uri(addr, insecure)?;
    let mut endpoint = Endpoint::from_shared(uri)
        .map_err(|_| ChannelzError::InvalidAddress(addr.to_string()))?
        .connect_timeout(timeout);
    if !insecure {
        endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
    }

    let channel = tokio::time::timeout(timeout, endpoint.connect())
        .await
        .map_err(|_| ChannelzError::Timeout(timeout))??;
    tracing::debug!("Connected to channelz service");
    Ok(channel)
}
