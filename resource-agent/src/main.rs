use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use resource_agent::resources::{Resource, parse_definition};
use resource_agent::{Agent, AgentConfig, LifecycleController};

#[derive(Parser)]
#[command(name = "resource-agent")]
#[command(about = "Node-local resource lifecycle agent", long_about = None)]
struct Cli {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the per-kind record stores
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory where host artifacts are materialized
    #[arg(long)]
    host_dir: Option<PathBuf>,

    /// Directory for the per-kind audit journals
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a resource from a YAML definition
    Create {
        kind: Kind,

        /// Definition file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show one resource, or all of a kind
    Get {
        kind: Kind,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Tear down a resource and drop its record
    Delete {
        kind: Kind,

        #[arg(short, long)]
        name: String,
    },

    /// Delete the resource of the same name, then create it again
    Replace {
        kind: Kind,

        /// Definition file
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Vm,
    Vhd,
    Nic,
    Lb,
    Keyvault,
}

enum Op {
    Create(PathBuf),
    Get(Option<String>),
    Delete(String),
    Replace(PathBuf),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("resource_agent=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AgentConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.host_dir {
        config.host_dir = dir;
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = dir;
    }

    info!(data_dir = %config.data_dir.display(), "Starting resource-agent");
    let agent = Agent::open(config)
        .await
        .context("Failed to initialize agent")?;

    let (kind, op) = match cli.command {
        Command::Create { kind, file } => (kind, Op::Create(file)),
        Command::Get { kind, name } => (kind, Op::Get(name)),
        Command::Delete { kind, name } => (kind, Op::Delete(name)),
        Command::Replace { kind, file } => (kind, Op::Replace(file)),
    };

    match kind {
        Kind::Vm => run(agent.vms(), op).await,
        Kind::Vhd => run(agent.disks(), op).await,
        Kind::Nic => run(agent.nics(), op).await,
        Kind::Lb => run(agent.load_balancers(), op).await,
        Kind::Keyvault => run(agent.key_vaults(), op).await,
    }
}

async fn run<R: Resource>(controller: &LifecycleController<R>, op: Op) -> anyhow::Result<()> {
    match op {
        Op::Create(file) => {
            let definition = read_definition::<R>(&file).await?;
            let record = controller.create(definition).await?;
            print_yaml(&record)?;
        }
        Op::Get(Some(name)) => {
            let record = controller.get_by_name(&name).await?;
            print_yaml(&record)?;
        }
        Op::Get(None) => {
            let records = controller.get(None).await?;
            print_yaml(&records)?;
        }
        Op::Delete(name) => {
            controller.delete(&name).await?;
            println!("Deleted {} '{}'", controller.kind(), name);
        }
        Op::Replace(file) => {
            let definition = read_definition::<R>(&file).await?;
            let record = controller.replace(definition).await?;
            print_yaml(&record)?;
        }
    }
    Ok(())
}

async fn read_definition<R: Resource>(path: &Path) -> anyhow::Result<R> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_definition(&contents)?)
}

fn print_yaml<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let yaml = serde_saphyr::to_string(value).context("Failed to encode output")?;
    print!("{}", yaml);
    Ok(())
}
