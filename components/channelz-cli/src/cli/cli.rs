// Local crates
use crate::{
    channelz::client::ChannelzError,
    helpers::load_config::Config,
    instrumentation::tracing::{TracingSettings, init_panic_handler, init_tracing},
    runtime::runtime::{self, Command, RunSettings},
};

// External crates
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "channelzcli",
    long_about = "channelzcli inspects a running gRPC process through its channelz service: channels, subchannels, servers and sockets.",
    about = "Command line client for gRPC channelz",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        channelzcli -a localhost:50051 list channel
        channelzcli -a localhost:50051 --json ls server
        channelzcli -a svc.example.com:443 --insecure=false describe serversocket 12
        channelzcli -c ./channelzcli.toml tree channel"
)]
pub struct Cli {
    /// Emit one JSON object per entity
    #[arg(short, long, global = true)]
    json: bool,

    /// Debug level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plaintext connection. Pass --insecure=false to use TLS with native roots
    #[arg(
        short = 'k',
        long,
        global = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    insecure: Option<bool>,

    /// Address of the channelz service, e.g. localhost:50051
    #[arg(short, long, global = true)]
    addr: Option<String>,

    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List channels, servers or server sockets
    #[command(visible_alias = "ls")]
    List {
        #[arg(value_enum)]
        kind: Kind,
    },

    /// Show channels with their subchannels and sockets, or servers with their listen sockets
    Tree {
        #[arg(value_enum)]
        kind: TreeKind,
    },

    /// Describe a single entity by name or id
    #[command(visible_aliases = ["desc", "d"])]
    Describe {
        #[arg(value_enum)]
        kind: Kind,
        /// Name or numeric id
        target: String,
    },

    /// Display version information
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    #[value(alias = "c")]
    Channel,
    #[value(alias = "s")]
    Server,
    #[value(aliases = ["so", "ss"])]
    Serversocket,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TreeKind {
    #[value(alias = "c")]
    Channel,
    #[value(alias = "s")]
    Server,
}

impl Commands {
    /// `None` for commands that do not talk to a channelz service.
    fn to_command(&self) -> Option<Command> {
        let command = match self {
            Self::List { kind } => match kind {
                Kind::Channel => Command::ListChannels,
                Kind::Server => Command::ListServers,
                Kind::Serversocket => Command::ListServerSockets,
            },
            Self::Tree { kind } => match kind {
                TreeKind::Channel => Command::TreeChannels,
                TreeKind::Server => Command::TreeServers,
            },
            Self::Describe { kind, target } => match kind {
                Kind::Channel => Command::DescribeChannel(target.clone()),
                Kind::Server => Command::DescribeServer(target.clone()),
                Kind::Serversocket => Command::DescribeServerSocket(target.clone()),
            },
            Self::Version => return None,
        };
        Some(command)
    }
}

/// Entry function for CLI
pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let _guard = init_tracing(&TracingSettings {
        verbose: cli.verbose,
        json: config.logging.json,
        level: config.logging.level.clone(),
    })?;
    init_panic_handler();

    let Some(command) = cli.command.to_command() else {
        show_version();
        return Ok(());
    };

    let settings = resolve_settings(&cli, &config)?;
    tracing::debug!(?command, ?settings, "Resolved command");
    // Errors are printed by main
    runtime::run_command(command, settings).await
}

/// Exit status for a rejected command line: 0 for `--help`/`--version`, 1 otherwise.
pub fn parse_error_exit_code(e: &clap::Error) -> u8 {
    if e.use_stderr() { 1 } else { 0 }
}

//
// ------------------------ Command Implementations ------------------------------
//

/// Merge flags over the config file. Flags always win.
fn resolve_settings(cli: &Cli, config: &Config) -> Result<RunSettings, ChannelzError> {
    let addr = cli
        .addr
        .clone()
        .or_else(|| config.connection.addr.clone())
        .filter(|addr| !addr.trim().is_empty())
        .ok_or(ChannelzError::MissingAddress)?;

    Ok(RunSettings {
        addr,
        insecure: cli.insecure.unwrap_or(config.connection.insecure),
        json: cli.json || config.output.json,
        connect_timeout: config.connection.connect_timeout(),
        command_timeout: config.connection.command_timeout(),
        retry_base_timeout: config.traversal.retry_base_timeout(),
        max_expansion_depth: config.traversal.max_expansion_depth,
    })
}

/// Show version information
fn show_version() {
    println!("channelzcli {}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("channelzcli").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn aliases_resolve_to_commands() {
        let cases = vec![
            (vec!["ls", "c"], Command::ListChannels),
            (vec!["list", "ss"], Command::ListServerSockets),
            (vec!["tree", "s"], Command::TreeServers),
            (vec!["desc", "so", "12"], Command::DescribeServerSocket("12".into())),
            (vec!["d", "server", "api"], Command::DescribeServer("api".into())),
        ];
        for (args, expected) in cases {
            assert_eq!(parse(&args).command.to_command(), Some(expected));
        }
        assert_eq!(parse(&["version"]).command.to_command(), None);
    }

    #[test]
    fn tree_rejects_serversocket() {
        let res = Cli::try_parse_from(["channelzcli", "tree", "serversocket"]);
        assert!(res.is_err());
    }

    #[test]
    fn help_exits_zero_and_usage_errors_exit_one() {
        let help = Cli::try_parse_from(["channelzcli", "--help"]).unwrap_err();
        assert_eq!(parse_error_exit_code(&help), 0);

        let usage = Cli::try_parse_from(["channelzcli", "tree", "serversocket"]).unwrap_err();
        assert_eq!(parse_error_exit_code(&usage), 1);
    }

    #[test]
    fn insecure_defaults_to_config_and_accepts_explicit_false() {
        let cli = parse(&["-a", "localhost:50051", "list", "channel"]);
        assert_eq!(cli.insecure, None);
        assert!(resolve_settings(&cli, &Config::default()).unwrap().insecure);

        let cli = parse(&["--insecure=false", "-a", "svc:443", "ls", "s"]);
        assert!(!resolve_settings(&cli, &Config::default()).unwrap().insecure);

        let cli = parse(&["-k", "-a", "svc:443", "ls", "s"]);
        assert_eq!(cli.insecure, Some(true));
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.connection.addr = Some("from-config:1".into());
        config.connection.insecure = false;
        config.traversal.retry_base_timeout_ms = 250;

        let settings = resolve_settings(&parse(&["ls", "c"]), &config).unwrap();
        assert_eq!(settings.addr, "from-config:1");
        assert!(!settings.insecure);
        assert_eq!(settings.retry_base_timeout, Duration::from_millis(250));

        let settings =
            resolve_settings(&parse(&["-j", "-a", "flag:2", "-k", "ls", "c"]), &config).unwrap();
        assert_eq!(settings.addr, "flag:2");
        assert!(settings.insecure);
        assert!(settings.json);
    }

    #[test]
    fn missing_address_is_an_error() {
        let res = resolve_settings(&parse(&["ls", "c"]), &Config::default());
        assert!(matches!(res, Err(ChannelzError::MissingAddress)));
    }
}
