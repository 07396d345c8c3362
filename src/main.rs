use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use funnel_engine::EngineConfig;
use funnel_engine::persistence::UtmParams;

mod cmd;

#[derive(Parser)]
#[command(name = "funnel-engine")]
#[command(version, about = "Published-funnel execution engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to engine.toml. Defaults to ./engine.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk through a funnel definition interactively
    Run {
        /// Path to the funnel definition JSON
        funnel: PathBuf,

        /// Serve the booking webhook for the scheduling widget
        #[arg(long)]
        webhook: bool,

        #[arg(long)]
        utm_source: Option<String>,

        #[arg(long)]
        utm_medium: Option<String>,

        #[arg(long)]
        utm_campaign: Option<String>,
    },
    /// Validate a funnel definition and report configuration problems
    Validate {
        /// Path to the funnel definition JSON
        funnel: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "funnel_engine=debug,info"
    } else {
        "funnel_engine=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from("engine.toml"));
    let mut config = EngineConfig::load_or_default(&config_path)?;
    config.apply_env();

    match cli.command {
        Commands::Run {
            funnel,
            webhook,
            utm_source,
            utm_medium,
            utm_campaign,
        } => {
            let utm = UtmParams {
                utm_source,
                utm_medium,
                utm_campaign,
            };
            cmd::cmd_run(&funnel, &config, webhook, utm).await
        }
        Commands::Validate { funnel } => cmd::cmd_validate(&funnel, &config),
    }
}
