use std::path::PathBuf;

use agentmesh_core::{TopologyConfig, TopologyKind};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

mod simulate;

use simulate::{SimulationOptions, load_config, run_simulation};

#[derive(Parser, Debug)]
#[command(name = "agentmesh", version)]
#[command(about = "agentmesh CLI - run simulated hub, peer and pipeline meshes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run mock agents through a topology and print a JSON summary
    Simulate {
        /// TOML topology configuration (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of mock agents
        #[arg(long, default_value_t = 4)]
        agents: usize,
        /// Number of messages to push through the topology
        #[arg(long, default_value_t = 100)]
        messages: usize,
        /// Override the topology kind from the config file
        #[arg(long, value_enum)]
        topology: Option<TopologyArg>,
        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },
    /// Inspect topology configuration
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        print_default: bool,
        /// Validate a configuration file and print it with defaults filled in
        #[arg(long, conflicts_with = "print_default")]
        check: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TopologyArg {
    Hub,
    Peer,
    Pipeline,
}

impl From<TopologyArg> for TopologyKind {
    fn from(arg: TopologyArg) -> Self {
        match arg {
            TopologyArg::Hub => TopologyKind::Hub,
            TopologyArg::Peer => TopologyKind::Peer,
            TopologyArg::Pipeline => TopologyKind::Pipeline,
        }
    }
}

/// Logs go to stderr so stdout carries only command output
fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            agents,
            messages,
            topology,
            json_logs,
        } => {
            init_tracing(json_logs);

            let mut config = load_config(config.as_deref())?;
            if let Some(kind) = topology {
                config.kind = kind.into();
            }

            let summary = run_simulation(SimulationOptions {
                config,
                agents,
                messages,
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Config {
            print_default,
            check,
        } => {
            init_tracing(false);

            let config = match check {
                Some(path) => load_config(Some(&path))?,
                None if print_default => TopologyConfig::default(),
                None => anyhow::bail!("nothing to do: pass --print-default or --check <file>"),
            };
            let rendered = config
                .to_toml_string()
                .context("failed to render configuration")?;
            print!("{}", rendered);
        }
    }

    Ok(())
}
