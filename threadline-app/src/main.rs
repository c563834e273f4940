use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use threadline_common::observability::{LogConfig, init_logging};
use threadline_config::{ThreadlineConfig, ThreadlineConfigLoader};

mod tether;

#[derive(Parser, Debug)]
#[command(name = "threadline", version, about = "Hashtag timeline services")]
struct Cli {
    /// YAML config file; `threadline.yaml` is picked up implicitly when present.
    #[arg(short, long, env = "THREADLINE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the user API and probes.
    Api,
    /// Consume hashtag jobs and publish enriched timelines.
    Worker,
    /// Enqueue one job per stored hashtag, then exit.
    Publish,
    /// Print the effective configuration (secrets masked).
    Config,
}

impl Command {
    fn app_name(&self) -> &'static str {
        match self {
            Command::Api => "threadline-api",
            Command::Worker => "threadline-worker",
            Command::Publish => "threadline-publisher",
            Command::Config => "threadline",
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ThreadlineConfig> {
    let loader = ThreadlineConfigLoader::new().with_default_files();
    let loader = match path {
        Some(p) => loader.with_file(p),
        None => loader,
    };
    Ok(loader.load()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // 1) Load config (env wins)
    let cfg = load_config(cli.config.as_ref())?;

    if let Command::Config = cli.command {
        print!("{}", cfg.to_redacted_yaml()?);
        return Ok(());
    }

    let log_path = init_logging(LogConfig {
        app_name: cli.command.app_name(),
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.emit_stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;
    tracing::info!(log = %log_path.display(), command = ?cli.command, "threadline.start");

    match cli.command {
        Command::Api => tether::run_api(&cfg).await,
        Command::Worker => tether::run_worker(&cfg).await,
        Command::Publish => tether::run_publisher(&cfg).await,
        Command::Config => Ok(()),
    }
}
